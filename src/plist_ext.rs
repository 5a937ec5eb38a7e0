use crate::error::Result;
use plist::Value;
use std::path::{Path, PathBuf};

/// A mutable view over one plist file. Changes are held in memory until
/// `save` writes the whole dictionary back as XML.
#[derive(Debug)]
pub struct PlistFile {
    pub path: PathBuf,
    pub data: plist::Dictionary,
}

impl PlistFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = plist::from_file::<_, plist::Dictionary>(&path)?;
        Ok(Self { path, data })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_string())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_boolean())
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_signed_integer())
    }

    pub fn get_date(&self, key: &str) -> Option<plist::Date> {
        match self.data.get(key) {
            Some(Value::Date(d)) => Some(d.to_owned()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn set_string(&mut self, key: &str, value: &str) {
        self.data
            .insert(key.to_string(), Value::String(value.to_string()));
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.data.insert(key.to_string(), Value::Boolean(value));
    }

    pub fn set_integer(&mut self, key: &str, value: i64) {
        self.data.insert(key.to_string(), Value::Integer(value.into()));
    }

    pub fn set_date(&mut self, key: &str, value: plist::Date) {
        self.data.insert(key.to_string(), Value::Date(value));
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn save(&self) -> Result<()> {
        plist::to_file_xml(&self.path, &self.data)?;
        Ok(())
    }
}
