/*
    ValueType - canonical value type handles

    Responsibilities:
    Every value carries a type tag: a 32-bit code (conventionally four ASCII
    characters such as "TEXT") and a display name. `ValueTypeRegistry` hands
    out exactly one instance per code so that types can be compared by
    identity. Codes arriving from the wire are attacker-controlled, so the
    registry keeps them in a bounded LRU; the well-known types are pinned and
    never evicted.

    A code first seen without a name gets the placeholder name "UNKNOWN".
    When a real name shows up later the cached instance is renamed in place.
*/

use hashlink::LruCache;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock, Mutex, RwLock};
use tracing::trace;

/// Name given to types whose code was seen before their name
pub const UNKNOWN_TYPE_NAME: &str = "UNKNOWN";

/// Default number of non-pinned types kept by the registry
pub const DEFAULT_TYPE_CACHE_SIZE: usize = 254;

/// Pack four ASCII characters into a type code
pub const fn type_code(tag: &[u8; 4]) -> u32 {
    ((tag[0] as u32) << 24) | ((tag[1] as u32) << 16) | ((tag[2] as u32) << 8) | (tag[3] as u32)
}

/// Render a type code as its four character tag, or hex if not printable
pub fn code_to_string(code: u32) -> String {
    let bytes = code.to_be_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        bytes.iter().map(|b| *b as char).collect()
    } else {
        format!("0x{:08x}", code)
    }
}

#[derive(Debug)]
struct ValueTypeInner {
    code: u32,
    name: RwLock<String>,
}

/// Handle to a canonical value type
///
/// Equality and hashing use the code. Use [`ValueType::ptr_eq`] to check
/// that two handles are the same canonical instance.
#[derive(Clone)]
pub struct ValueType(Arc<ValueTypeInner>);

impl ValueType {
    fn new(name: &str, code: u32) -> Self {
        ValueType(Arc::new(ValueTypeInner { code, name: RwLock::new(name.to_string()) }))
    }

    pub fn code(&self) -> u32 {
        self.0.code
    }

    pub fn name(&self) -> String {
        self.0.name.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_unknown(&self) -> bool {
        self.0.name.read().unwrap_or_else(|e| e.into_inner()).as_str() == UNKNOWN_TYPE_NAME
    }

    /// The wildcard type, also the type of the empty value
    pub fn any() -> ValueType {
        ANY.clone()
    }

    pub fn binary() -> ValueType {
        BINARY.clone()
    }

    pub fn text() -> ValueType {
        TEXT.clone()
    }

    pub fn test() -> ValueType {
        TEST.clone()
    }

    pub fn is_any(&self) -> bool {
        self.code() == ANY_CODE
    }

    pub fn ptr_eq(a: &ValueType, b: &ValueType) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    fn refine_name(&self, name: &str) -> bool {
        let mut current = self.0.name.write().unwrap_or_else(|e| e.into_inner());
        if current.as_str() == UNKNOWN_TYPE_NAME && name != UNKNOWN_TYPE_NAME {
            *current = name.to_string();
            true
        } else {
            false
        }
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for ValueType {}

impl Hash for ValueType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code().hash(state);
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name(), code_to_string(self.code()))
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueType({})", self)
    }
}

pub const ANY_CODE: u32 = type_code(b"****");
pub const BINARY_CODE: u32 = type_code(b"BINA");
pub const TEXT_CODE: u32 = type_code(b"TEXT");
pub const TEST_CODE: u32 = type_code(b"TEST");

static ANY: LazyLock<ValueType> = LazyLock::new(|| ValueType::new("ANY", ANY_CODE));
static BINARY: LazyLock<ValueType> = LazyLock::new(|| ValueType::new("BINARY", BINARY_CODE));
static TEXT: LazyLock<ValueType> = LazyLock::new(|| ValueType::new("TEXT", TEXT_CODE));
static TEST: LazyLock<ValueType> = LazyLock::new(|| ValueType::new("TEST", TEST_CODE));

fn well_known(code: u32) -> Option<ValueType> {
    match code {
        ANY_CODE => Some(ValueType::any()),
        BINARY_CODE => Some(ValueType::binary()),
        TEXT_CODE => Some(ValueType::text()),
        TEST_CODE => Some(ValueType::test()),
        _ => None,
    }
}

/// Per-node interning table for value types
pub struct ValueTypeRegistry {
    cache: Mutex<LruCache<u32, ValueType>>,
}

impl ValueTypeRegistry {
    pub fn new(capacity: usize) -> Self {
        ValueTypeRegistry { cache: Mutex::new(LruCache::new(capacity.max(1))) }
    }

    /// Return the canonical instance for `code`, creating it if needed
    pub fn canonical(&self, name: &str, code: u32) -> ValueType {
        if let Some(value_type) = well_known(code) {
            return value_type;
        }

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = cache.get(&code) {
            if existing.refine_name(name) {
                trace!(code = %code_to_string(code), name, "Refined value type name");
            }
            return existing.clone();
        }

        let value_type = ValueType::new(name, code);
        cache.insert(code, value_type.clone());
        value_type
    }

    /// Canonical instance for a code seen without a name
    pub fn value_of(&self, code: u32) -> ValueType {
        self.canonical(UNKNOWN_TYPE_NAME, code)
    }

    /// Number of cached (non-pinned) types
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ValueTypeRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TYPE_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_packing() {
        assert_eq!(type_code(b"TEXT"), 0x5445_5854);
        assert_eq!(code_to_string(TEXT_CODE), "TEXT");
        assert_eq!(code_to_string(0x0000_0001), "0x00000001");
    }

    #[test]
    fn test_canonical_returns_same_instance() {
        let registry = ValueTypeRegistry::default();
        let code = type_code(b"ALOC");

        let first = registry.canonical("ALT_LOC", code);
        let second = registry.canonical("SOMETHING_ELSE", code);

        assert!(ValueType::ptr_eq(&first, &second));
        assert_eq!(second.name(), "ALT_LOC");
    }

    #[test]
    fn test_placeholder_name_is_refined() {
        let registry = ValueTypeRegistry::default();
        let code = type_code(b"PROX");

        let unknown = registry.value_of(code);
        assert!(unknown.is_unknown());

        let named = registry.canonical("PUSH_PROXY", code);
        assert!(ValueType::ptr_eq(&unknown, &named));
        assert_eq!(unknown.name(), "PUSH_PROXY");

        // A placeholder never replaces a real name
        registry.value_of(code);
        assert_eq!(named.name(), "PUSH_PROXY");
    }

    #[test]
    fn test_well_known_types_are_pinned() {
        let registry = ValueTypeRegistry::new(2);
        for i in 0..10u32 {
            registry.value_of(0x1000 + i);
        }
        assert_eq!(registry.len(), 2);
        assert!(ValueType::ptr_eq(&registry.value_of(TEXT_CODE), &ValueType::text()));
        assert_eq!(registry.canonical("whatever", ANY_CODE).name(), "ANY");
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let registry = ValueTypeRegistry::new(2);
        let a = registry.canonical("A", 1);
        let _b = registry.canonical("B", 2);

        // Touch A so that B is the oldest entry
        registry.value_of(1);
        registry.canonical("C", 3);

        assert!(ValueType::ptr_eq(&registry.value_of(1), &a));
        assert!(registry.value_of(2).is_unknown());
    }

    #[test]
    fn test_value_type_equality_by_code() {
        let first = ValueTypeRegistry::default().canonical("X", 42);
        let second = ValueTypeRegistry::default().canonical("X", 42);
        assert_eq!(first, second);
        assert!(!ValueType::ptr_eq(&first, &second));
    }
}
