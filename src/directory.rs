use indexmap::IndexMap;

use crate::fetch::DecodeError;

/// Resolved mapping from logical service names to live URLs, parsed from the
/// bootstrap resource's line-delimited `key = value` text. Multi-valued
/// entries (rotating splash text) keep the whole comma-separated value and are
/// read through [`EndpointDirectory::get_list`].
///
/// The directory is always swapped in as a whole; readers never observe a
/// partially-updated mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointDirectory {
    entries: IndexMap<String, String>,
}

impl EndpointDirectory {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| DecodeError::Invalid("directory payload is not utf-8".to_owned()))?;
        Self::parse(text)
    }

    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let mut entries = IndexMap::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            entries.insert(key.to_owned(), value.trim().to_owned());
        }
        if entries.is_empty() {
            return Err(DecodeError::Invalid(
                "no key=value entries in directory payload".to_owned(),
            ));
        }
        Ok(Self { entries })
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_list(&self, key: &str) -> Option<Vec<&str>> {
        let value = self.entries.get(key)?;
        let items: Vec<&str> = value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            None
        } else {
            Some(items)
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.get("WynnApiKey")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Picks one splash entry, varying by wall clock.
    pub fn pick_splash(&self) -> Option<String> {
        let splashes = self.get_list("Splashes")?;
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|value| value.as_millis() as usize)
            .unwrap_or(0);
        splashes.get(seed % splashes.len()).map(|s| (*s).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::EndpointDirectory;

    #[test]
    fn parses_key_value_lines_with_trimming() {
        let text = "\n# bootstrap\nAthena = https://athena.example\n  PlayerStatsv2=https://api.example/stats/  \nnot a pair\n";
        let directory = EndpointDirectory::parse(text).expect("directory should parse");
        assert_eq!(directory.len(), 2);
        assert!(directory.has_key("Athena"));
        assert_eq!(directory.get("Athena"), Some("https://athena.example"));
        assert_eq!(
            directory.get("PlayerStatsv2"),
            Some("https://api.example/stats/")
        );
        assert!(!directory.has_key("not a pair"));
    }

    #[test]
    fn get_list_splits_on_commas() {
        let directory =
            EndpointDirectory::parse("Splashes = first splash, second splash ,, third")
                .expect("directory should parse");
        assert_eq!(
            directory.get_list("Splashes"),
            Some(vec!["first splash", "second splash", "third"])
        );
        assert!(directory.get_list("Missing").is_none());
    }

    #[test]
    fn empty_payload_is_a_decode_error() {
        assert!(EndpointDirectory::parse("").is_err());
        assert!(EndpointDirectory::parse("# only a comment\n\n").is_err());
    }

    #[test]
    fn non_utf8_payload_is_a_decode_error() {
        assert!(EndpointDirectory::decode(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn pick_splash_returns_a_listed_entry() {
        let directory =
            EndpointDirectory::parse("Splashes = alpha, beta, gamma").expect("should parse");
        let splash = directory.pick_splash().expect("splash should be picked");
        assert!(["alpha", "beta", "gamma"].contains(&splash.as_str()));
    }

    #[test]
    fn api_key_reads_the_dedicated_entry() {
        let directory = EndpointDirectory::parse("WynnApiKey = secret-key\nAthena = x")
            .expect("should parse");
        assert_eq!(directory.api_key(), Some("secret-key"));
    }
}
