use rand::seq::IndexedRandom;
use serde_json::Value;

use crate::error::{BotError, Result};

/// User-facing text looked up by dotted key
#[derive(Debug, Clone, Default)]
pub struct Translations {
    root: Value,
}

impl Translations {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BotError::ConfigLoad {
            path: path.to_string(),
            source: e,
        })?;
        let root = serde_json::from_str(&content).map_err(|e| BotError::ConfigParse {
            path: path.to_string(),
            source: e,
        })?;
        Ok(Self { root })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Text for `key`, or the key itself when nothing usable is there.
    ///
    /// Arrays yield a random element; objects yield their `"__"` entry.
    pub fn resolve(&self, key: &str) -> String {
        let mut item = key
            .split('.')
            .try_fold(&self.root, |node, part| node.get(part));

        if let Some(Value::Object(map)) = item {
            item = map.get("__");
        }

        let text = match item {
            Some(Value::String(s)) => Some(s.as_str()),
            Some(Value::Array(values)) => values
                .choose(&mut rand::rng())
                .and_then(|v| v.as_str()),
            _ => None,
        };

        text.unwrap_or(key).to_string()
    }

    /// Like [`resolve`](Self::resolve), filling `{}` placeholders in order
    pub fn resolve_with(&self, key: &str, args: &[&str]) -> String {
        let template = self.resolve(key);
        let mut out = String::with_capacity(template.len());
        let mut args = args.iter();
        let mut rest = template.as_str();

        while let Some(pos) = rest.find("{}") {
            out.push_str(&rest[..pos]);
            match args.next() {
                Some(arg) => out.push_str(arg),
                None => out.push_str("{}"),
            }
            rest = &rest[pos + 2..];
        }
        out.push_str(rest);
        out
    }
}
