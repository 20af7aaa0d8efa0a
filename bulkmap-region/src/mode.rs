/// Access and sharing semantics of a mapping.
///
/// | mode | read | write | visibility of writes |
/// |---|---|---|---|
/// | `ReadOnly` | yes | no | n/a |
/// | `WritePrivate` | yes | yes | copy-on-write, never reaches the file |
/// | `WriteShared` | yes | yes | shared, written back to a backing file |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingMode {
    /// Pages may be read but not written.
    ReadOnly,
    /// Writes stay private to this mapping.
    WritePrivate,
    /// Writes are visible to other mappings of the same file.
    WriteShared,
}

impl MappingMode {
    /// Whether the mapping accepts writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}
