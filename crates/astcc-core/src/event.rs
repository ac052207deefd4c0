//! Manager event record.

/// One event pushed by the manager session: an ordered list of
/// `Key: Value` headers.
///
/// Header lookup is case-insensitive and the first occurrence of a key wins.
/// Events are handed to the dispatcher by value and dropped when handling
/// returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManagerEvent {
    headers: Vec<(String, String)>,
}

impl ManagerEvent {
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }

    /// Value of the `Event` header, if present.
    pub fn name(&self) -> Option<&str> {
        self.get("Event")
    }

    /// Case-insensitive header lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ManagerEvent
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            headers: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
