use serde::Serialize;

/// Value and bounds of a script-declared tunable.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionValue {
    Int { value: i64, min: i64, max: i64 },
    Bool { value: bool },
}

/// One tunable exposed to the host's configuration UI. Declared only while
/// the script is (re)loading, read by the host afterward.
#[derive(Clone, Debug, Serialize)]
pub struct OptionEntry {
    pub name: String,
    pub desc: String,
    pub value: OptionValue,
}

/// Script-declared options in declaration order. Rebuilt from scratch on
/// every reload.
#[derive(Default)]
pub struct OptionRegistry {
    entries: Vec<OptionEntry>,
}

impl OptionRegistry {
    /// Declares or re-declares an option. Re-declaring an existing name
    /// overwrites it in place, including across types, keeping its position
    /// in the host UI.
    pub fn declare(&mut self, name: &str, desc: &str, value: OptionValue) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name) {
            existing.desc = desc.to_string();
            existing.value = value;
        } else {
            self.entries.push(OptionEntry {
                name: name.to_string(),
                desc: desc.to_string(),
                value,
            });
        }
    }

    pub fn get(&self, name: &str) -> Option<&OptionEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
