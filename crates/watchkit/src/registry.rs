use std::path::Path;

use tracing::{debug, warn};

use crate::factory::module_from_definition;
use crate::module::Module;

/// Owns every module plus a movable cursor over them. The cursor can sit one
/// past the final element, which is also where an empty registry starts.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Module>,
    cursor: usize,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `module_begin … module_end` blocks, keeping file order. Lines
    /// starting with `#` are comments. Blocks the factory rejects are
    /// dropped without an error; so is a trailing unterminated block.
    pub fn parse(text: &str) -> Self {
        let mut registry = Self::new();
        let mut block: Option<Vec<(String, String)>> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k, v.trim()),
                None => (line, ""),
            };

            if key == "module_begin" {
                if block.is_some() {
                    debug!("module_begin before module_end, restarting block");
                }
                block = Some(Vec::new());
            } else if key == "module_end" {
                match block.take() {
                    Some(body) => match module_from_definition(&body) {
                        Some(module) => registry.push(module),
                        None => debug!("dropping unusable module block"),
                    },
                    None => debug!("module_end without module_begin"),
                }
            } else if let Some(body) = &mut block {
                body.push((key.to_string(), value.to_string()));
            }
        }
        if block.is_some() {
            debug!("unterminated module block dropped");
        }
        registry
    }

    /// Load definitions from a file. An unreadable file yields an empty
    /// registry so the agent still starts.
    pub fn from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read module definitions");
                Self::new()
            }
        }
    }

    pub fn push(&mut self, module: Module) {
        self.modules.push(module);
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn go_first(&mut self) {
        self.cursor = 0;
    }

    /// Jump to the past-the-end position; step back with `go_prev` to reach
    /// the final element.
    pub fn go_last(&mut self) {
        self.cursor = self.modules.len();
    }

    pub fn go_next(&mut self) {
        if !self.is_last() {
            self.cursor += 1;
        }
    }

    pub fn go_prev(&mut self) {
        if !self.is_first() {
            self.cursor -= 1;
        }
    }

    pub fn is_first(&self) -> bool {
        self.cursor == 0
    }

    pub fn is_last(&self) -> bool {
        self.cursor == self.modules.len()
    }

    /// The module under the cursor, or nothing at the past-the-end position.
    pub fn current(&self) -> Option<&Module> {
        self.modules.get(self.cursor)
    }

    pub fn current_mut(&mut self) -> Option<&mut Module> {
        self.modules.get_mut(self.cursor)
    }
}
