use std::sync::{Arc, RwLock};

/// The editable document shared by the code tools and the preview.
///
/// Handlers hold a clone and read through it at call time, so a tool
/// registered once always sees the latest buffer.
#[derive(Debug, Clone)]
pub struct CodeWorkspace {
    buffer: Arc<RwLock<String>>,
}

impl Default for CodeWorkspace {
    fn default() -> Self {
        Self::from_template(CodeTemplate::HelloWorld)
    }
}

impl CodeWorkspace {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            buffer: Arc::new(RwLock::new(code.into())),
        }
    }

    pub fn from_template(template: CodeTemplate) -> Self {
        Self::new(template.code())
    }

    pub fn current_code(&self) -> String {
        self.buffer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the whole buffer.
    pub fn set_code(&self, code: impl Into<String>) {
        *self.buffer.write().unwrap_or_else(|e| e.into_inner()) = code.into();
    }

    pub fn load_template(&self, template: CodeTemplate) {
        self.set_code(template.code());
    }
}

/// Starter documents for the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeTemplate {
    Blank,
    HelloWorld,
    Counter,
    Animation,
}

impl CodeTemplate {
    pub const ALL: [CodeTemplate; 4] = [
        CodeTemplate::Blank,
        CodeTemplate::HelloWorld,
        CodeTemplate::Counter,
        CodeTemplate::Animation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CodeTemplate::Blank => "Blank",
            CodeTemplate::HelloWorld => "Hello World",
            CodeTemplate::Counter => "Interactive Counter",
            CodeTemplate::Animation => "CSS Animation",
        }
    }

    /// Short key accepted by [`CodeTemplate::from_key`].
    pub fn key(self) -> &'static str {
        match self {
            CodeTemplate::Blank => "blank",
            CodeTemplate::HelloWorld => "hello",
            CodeTemplate::Counter => "counter",
            CodeTemplate::Animation => "animation",
        }
    }

    /// Parse a template key such as `hello` or `counter`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "blank" => Some(CodeTemplate::Blank),
            "hello" | "hello-world" | "hello_world" => Some(CodeTemplate::HelloWorld),
            "counter" => Some(CodeTemplate::Counter),
            "animation" => Some(CodeTemplate::Animation),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            CodeTemplate::Blank => "",
            CodeTemplate::HelloWorld => HELLO_WORLD,
            CodeTemplate::Counter => COUNTER,
            CodeTemplate::Animation => ANIMATION,
        }
    }
}

const HELLO_WORLD: &str = r#"<!DOCTYPE html>
<html>
<head>
  <style>
    body { font-family: system-ui; padding: 2rem; background: #1a1a1a; color: #fff; }
    h1 { color: #ff6900; }
  </style>
</head>
<body>
  <h1>Hello, World!</h1>
  <p>Edit the code and see live changes.</p>
</body>
</html>"#;

const COUNTER: &str = r#"<!DOCTYPE html>
<html>
<head>
  <style>
    body { font-family: system-ui; display: flex; justify-content: center;
           align-items: center; min-height: 100vh; background: #1a1a1a; color: #fff; }
    .counter { text-align: center; }
    h1 { font-size: 4rem; margin: 1rem 0; color: #ff6900; }
    button { padding: 1rem 2rem; font-size: 1.2rem; margin: 0.5rem;
             background: #ff6900; color: #fff; border: none;
             border-radius: 8px; cursor: pointer; }
    button:hover { background: #e55d00; }
  </style>
</head>
<body>
  <div class="counter">
    <h1 id="count">0</h1>
    <button onclick="decrement()">-</button>
    <button onclick="reset()">Reset</button>
    <button onclick="increment()">+</button>
  </div>
  <script>
    let count = 0;
    const display = document.getElementById('count');
    function increment() { count++; display.textContent = count; }
    function decrement() { count--; display.textContent = count; }
    function reset() { count = 0; display.textContent = count; }
  </script>
</body>
</html>"#;

const ANIMATION: &str = r#"<!DOCTYPE html>
<html>
<head>
  <style>
    body { margin: 0; padding: 0; background: #0a0a0a;
           display: flex; justify-content: center; align-items: center;
           min-height: 100vh; overflow: hidden; }
    .box { width: 100px; height: 100px; background: linear-gradient(135deg, #ff6900, #e55d00);
           border-radius: 20px; animation: float 3s ease-in-out infinite;
           box-shadow: 0 10px 30px rgba(255, 105, 0, 0.5); }
    @keyframes float {
      0%, 100% { transform: translateY(0) rotate(0deg); }
      50% { transform: translateY(-30px) rotate(180deg); }
    }
  </style>
</head>
<body>
  <div class="box"></div>
</body>
</html>"#;
