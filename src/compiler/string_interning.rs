use std::collections::HashMap;

/// A unique identifier for an interned string, represented as a u32 for memory efficiency.
/// This provides type safety to prevent mixing string IDs with other integer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(u32);

impl StringId {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Compare this interned string with a string slice without allocating.
    /// Requires access to the StringTable that created this ID.
    pub fn eq_str(self, table: &StringTable, other: &str) -> bool {
        table.resolve(self) == other
    }

    /// Resolve this interned string using the provided StringTable.
    pub fn resolve(self, table: &StringTable) -> &str {
        table.resolve(self)
    }
}

impl std::fmt::Display for StringId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StringId({})", self.0)
    }
}

/// A centralized string interning table that stores unique strings only once in memory.
///
/// Module names, symbol names and struct/field names all live here, so lookups
/// in the registry and the caches compare u32 IDs instead of bytes.
///
/// The table uses a dual-mapping approach:
/// - Vec<String> for O(1) ID -> string resolution
/// - HashMap<String, StringId> for O(1) string -> ID lookup during interning
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    /// Primary storage: ID -> String mapping for fast resolution
    strings: Vec<String>,

    /// Reverse lookup: String -> ID mapping for fast interning
    string_to_id: HashMap<String, StringId>,
}

impl StringTable {
    pub fn new() -> Self {
        Self {
            strings: Vec::new(),
            string_to_id: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            strings: Vec::with_capacity(capacity),
            string_to_id: HashMap::with_capacity(capacity),
        }
    }

    /// Intern a string slice, returning its unique ID.
    /// If the string already exists, returns the existing ID.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&existing_id) = self.string_to_id.get(s) {
            return existing_id;
        }

        let new_id = StringId(self.strings.len() as u32);
        self.strings.push(s.to_owned());
        self.string_to_id.insert(s.to_owned(), new_id);
        new_id
    }

    /// Resolve an ID back to its string.
    ///
    /// Panics if the ID did not come from this table, which would be a
    /// compiler bug rather than a user error.
    pub fn resolve(&self, id: StringId) -> &str {
        &self.strings[id.0 as usize]
    }

    /// Look up an ID without interning. Returns None if the string was never interned.
    pub fn get(&self, s: &str) -> Option<StringId> {
        self.string_to_id.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
