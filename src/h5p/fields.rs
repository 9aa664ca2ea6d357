use serde_json::{Map, Value};

use crate::config::FieldConfig;
use crate::error::{Result, H5pError};
use crate::text::{should_translate, visible_text};

/// A string inside content.json selected for translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatableField {
    /// RFC 6901 pointer used to write the translation back
    pub pointer: String,
    /// Human-readable location, e.g. `root/questions[0]/answers[1]/text`
    pub path: String,
    /// Object key holding the value; `None` for bare strings in arrays
    pub key: Option<String>,
    pub text: String,
}

/// Walk a content document and collect every translatable string in document order
pub fn select_fields(root: &Value, config: &FieldConfig) -> Vec<TranslatableField> {
    let mut fields = Vec::new();
    let walker = Walker { config, fields: &mut fields };
    walker.walk(root, "", "root");
    fields
}

/// Replace the values at the given pointers
pub fn apply_translations(root: &mut Value, updates: &[(String, String)]) -> Result<usize> {
    for (pointer, text) in updates {
        let slot = root.pointer_mut(pointer).ok_or_else(|| {
            H5pError::Package(format!("Translated field {} no longer exists", pointer))
        })?;
        *slot = Value::String(text.clone());
    }
    Ok(updates.len())
}

struct Walker<'a> {
    config: &'a FieldConfig,
    fields: &'a mut Vec<TranslatableField>,
}

impl Walker<'_> {
    fn walk(mut self, value: &Value, pointer: &str, path: &str) {
        self.visit(value, pointer, path);
    }

    fn visit(&mut self, value: &Value, pointer: &str, path: &str) {
        match value {
            Value::Object(map) => self.visit_object(map, pointer, path, None),
            Value::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    let item_pointer = format!("{}/{}", pointer, idx);
                    let item_path = format!("{}[{}]", path, idx);
                    match item {
                        Value::Object(_) | Value::Array(_) => self.visit(item, &item_pointer, &item_path),
                        Value::String(text) if self.config.translate_list_strings => {
                            self.select(item_pointer, item_path, None, text);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn visit_object(&mut self, map: &Map<String, Value>, pointer: &str, path: &str, except: Option<&str>) {
        for (key, value) in map {
            if except == Some(key.as_str()) || self.is_skipped(key) {
                continue;
            }

            let child_pointer = format!("{}/{}", pointer, escape_pointer_token(key));
            let child_path = format!("{}/{}", path, key);

            match value {
                Value::Array(items) if self.is_answer_list(key) => {
                    self.visit_answers(items, &child_pointer, &child_path);
                }
                Value::Object(_) | Value::Array(_) => self.visit(value, &child_pointer, &child_path),
                Value::String(text) if self.is_translatable(key) => {
                    self.select(child_pointer, child_path, Some(key.clone()), text);
                }
                _ => {}
            }
        }
    }

    /// Answer objects always have their `text` translated, whatever the key set says
    fn visit_answers(&mut self, items: &[Value], pointer: &str, path: &str) {
        for (idx, item) in items.iter().enumerate() {
            let item_pointer = format!("{}/{}", pointer, idx);
            let item_path = format!("{}[{}]", path, idx);

            match item {
                Value::Object(answer) => match answer.get("text") {
                    Some(Value::String(text)) => {
                        self.select(
                            format!("{}/text", item_pointer),
                            format!("{}/text", item_path),
                            Some("text".to_string()),
                            text,
                        );
                        self.visit_object(answer, &item_pointer, &item_path, Some("text"));
                    }
                    _ => self.visit_object(answer, &item_pointer, &item_path, None),
                },
                Value::Array(_) => self.visit(item, &item_pointer, &item_path),
                Value::String(text) if self.config.translate_list_strings => {
                    self.select(item_pointer, item_path, None, text);
                }
                _ => {}
            }
        }
    }

    fn select(&mut self, pointer: String, path: String, key: Option<String>, text: &str) {
        if !should_translate(&visible_text(text)) {
            return;
        }
        self.fields.push(TranslatableField {
            pointer,
            path,
            key,
            text: text.to_string(),
        });
    }

    fn is_skipped(&self, key: &str) -> bool {
        self.config.skip_keys.iter().any(|k| k == key)
    }

    fn is_translatable(&self, key: &str) -> bool {
        self.config.translatable_keys.iter().any(|k| k == key)
    }

    fn is_answer_list(&self, key: &str) -> bool {
        self.config.answer_list_keys.iter().any(|k| k == key)
    }
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
