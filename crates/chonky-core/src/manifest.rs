//! The chonky manifest: a hand-rolled, case-sensitive INI codec.
//!
//! Deliberately does not reuse a generic INI crate — every one we looked at
//! case-folds keys by default, which would silently merge `Foo.txt` and
//! `foo.txt` entries in the `HEAD` section. The format itself is simple
//! enough (two sections, `key = value` lines, `;`/`#` comments) that a small
//! hand-written parser is both correct and easy to audit.

use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{ChonkyError, ChonkyResult};
use crate::types::ContentHash;

const SECTION_CONFIG: &str = "config";
const SECTION_HEAD: &str = "HEAD";

/// A loaded manifest: the `[config]` section (insertion-ordered, opaque
/// string values) and the `[HEAD]` section (path → content hash, always
/// iterated in ascending key order).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    config: IndexMap<String, String>,
    head: BTreeMap<String, ContentHash>,
}

impl Manifest {
    /// An empty manifest with both required sections present.
    pub fn empty() -> Self {
        Manifest {
            config: IndexMap::new(),
            head: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> ChonkyResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ChonkyError::Io(e))?;
        Self::parse(&text)
    }

    /// Write the manifest atomically (write to a temp file, then rename).
    pub fn save(&self, path: &Path) -> ChonkyResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.render())?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn config_get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    pub fn config_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    pub fn head_get(&self, path: &str) -> Option<&ContentHash> {
        self.head.get(path)
    }

    pub fn head_set(&mut self, path: impl Into<String>, hash: ContentHash) {
        self.head.insert(path.into(), hash);
    }

    pub fn head_delete(&mut self, path: &str) -> Option<ContentHash> {
        self.head.remove(path)
    }

    /// HEAD entries in ascending Unicode-codepoint order by path.
    pub fn head_items(&self) -> impl Iterator<Item = (&str, &ContentHash)> {
        self.head.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn head_len(&self) -> usize {
        self.head.len()
    }

    /// Replace the whole HEAD section (used by submit/sync to commit the
    /// working manifest's state in one shot).
    pub fn set_head(&mut self, head: BTreeMap<String, ContentHash>) {
        self.head = head;
    }

    pub(crate) fn head_map(&self) -> &BTreeMap<String, ContentHash> {
        &self.head
    }

    fn parse(text: &str) -> ChonkyResult<Self> {
        let mut config = IndexMap::new();
        let mut head = BTreeMap::new();
        let mut section: Option<String> = None;
        let mut saw_config = false;
        let mut saw_head = false;

        for raw_line in text.lines() {
            let line = strip_inline_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(name) = parse_section_header(line)? {
                match name.as_str() {
                    SECTION_CONFIG => saw_config = true,
                    SECTION_HEAD => saw_head = true,
                    _ => {}
                }
                section = Some(name);
                continue;
            }

            let eq = line
                .find('=')
                .ok_or_else(|| ChonkyError::Parse(format!("expected 'key = value': {raw_line:?}")))?;
            let key = line[..eq].trim();
            let value = line[eq + 1..].trim();
            if key.is_empty() {
                return Err(ChonkyError::Parse(format!("empty key: {raw_line:?}")));
            }

            match section.as_deref() {
                Some(SECTION_CONFIG) => {
                    config.insert(key.to_string(), value.to_string());
                }
                Some(SECTION_HEAD) => {
                    let hash = ContentHash::new(value).map_err(|e| {
                        ChonkyError::Parse(format!("HEAD entry {key:?}: {e}"))
                    })?;
                    head.insert(key.to_string(), hash);
                }
                Some(other) => {
                    return Err(ChonkyError::Parse(format!("unknown section [{other}]")));
                }
                None => {
                    return Err(ChonkyError::Parse(
                        "entry appears before any [section] header".into(),
                    ));
                }
            }
        }

        if !saw_config || !saw_head {
            return Err(ChonkyError::Parse(
                "manifest must declare both [config] and [HEAD] sections".into(),
            ));
        }

        Ok(Manifest { config, head })
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("[config]\n");
        for (k, v) in &self.config {
            out.push_str(k);
            out.push_str(" = ");
            out.push_str(v);
            out.push('\n');
        }
        out.push('\n');
        out.push_str("[HEAD]\n");
        for (k, v) in &self.head {
            out.push_str(k);
            out.push_str(" = ");
            out.push_str(v.as_str());
            out.push('\n');
        }
        out
    }
}

fn parse_section_header(line: &str) -> ChonkyResult<Option<String>> {
    if !line.starts_with('[') {
        return Ok(None);
    }
    let end = line
        .find(']')
        .ok_or_else(|| ChonkyError::Parse(format!("malformed section header: {line:?}")))?;
    Ok(Some(line[1..end].to_string()))
}

/// Strip a trailing `;` or `#` comment, but only when the marker is at the
/// start of the line or preceded by whitespace — avoids truncating values
/// that legitimately contain those characters mid-token (e.g. a URL).
fn strip_inline_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, c) in line.char_indices() {
        if (c == ';' || c == '#') && (i == 0 || bytes[i - 1] == b' ' || bytes[i - 1] == b'\t') {
            return &line[..i];
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(seed: u8) -> ContentHash {
        ContentHash::new(format!("{:02x}", seed).repeat(20)).unwrap()
    }

    #[test]
    fn parses_full_example() {
        let text = "\
[config]
type = s3
bucket = my-bucket
endpoint = https://s3.example.com        ; optional; default backend-decides
root = some/prefix                       ; optional; default empty
workspace = Assets/                      ; required; relative to manifest parent
ignore = *.tmp build/ cache/             ; optional; whitespace-separated globs

[HEAD]
path/to/file.bin = 3a5c0000000000000000000000000000000000e9
other.txt        = 0b2f00000000000000000000000000000000001a
";
        let manifest = Manifest::parse(text).unwrap();
        assert_eq!(manifest.config_get("type"), Some("s3"));
        assert_eq!(manifest.config_get("bucket"), Some("my-bucket"));
        assert_eq!(manifest.config_get("workspace"), Some("Assets/"));
        assert_eq!(manifest.config_get("ignore"), Some("*.tmp build/ cache/"));
        assert_eq!(manifest.head_len(), 2);
    }

    #[test]
    fn empty_head_is_legal() {
        let text = "[config]\nworkspace = Assets/\n\n[HEAD]\n";
        let manifest = Manifest::parse(text).unwrap();
        assert_eq!(manifest.head_len(), 0);
    }

    #[test]
    fn missing_head_section_fails() {
        let text = "[config]\nworkspace = Assets/\n";
        assert!(Manifest::parse(text).is_err());
    }

    #[test]
    fn keys_are_case_sensitive() {
        let mut m = Manifest::empty();
        m.head_set("Foo.txt", hash(1));
        m.head_set("foo.txt", hash(2));
        assert_eq!(m.head_len(), 2);
    }

    #[test]
    fn head_items_sorted_ascending() {
        let mut m = Manifest::empty();
        m.head_set("zeta.txt", hash(1));
        m.head_set("alpha.txt", hash(2));
        m.head_set("Mid.txt", hash(3));
        let paths: Vec<&str> = m.head_items().map(|(p, _)| p).collect();
        let mut expected = paths.clone();
        expected.sort();
        assert_eq!(paths, expected);
    }

    #[test]
    fn save_then_load_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHONKY");

        let mut m = Manifest::empty();
        m.config_set("type", "s3");
        m.config_set("workspace", "Assets/");
        m.head_set("b.txt", hash(2));
        m.head_set("a.txt", hash(1));
        m.save(&path).unwrap();

        let first_bytes = std::fs::read(&path).unwrap();
        let loaded = Manifest::load(&path).unwrap();
        loaded.save(&path).unwrap();
        let second_bytes = std::fs::read(&path).unwrap();

        assert_eq!(first_bytes, second_bytes, "P5: manifest order-stability");
        assert_eq!(loaded.config_get("type"), Some("s3"));
    }

    #[test]
    fn rejects_entry_before_section() {
        let text = "key = value\n[config]\n[HEAD]\n";
        assert!(Manifest::parse(text).is_err());
    }

    #[test]
    fn rejects_malformed_hash() {
        let text = "[config]\n[HEAD]\nfile.txt = not-a-hash\n";
        assert!(Manifest::parse(text).is_err());
    }

    #[test]
    fn full_line_comment_is_ignored() {
        let text = "[config]\n; this is a comment\n# so is this\nworkspace = Assets/\n[HEAD]\n";
        let m = Manifest::parse(text).unwrap();
        assert_eq!(m.config_get("workspace"), Some("Assets/"));
    }
}
