use crate::UPGRADE_FUNCTION_NAME;
use std::collections::BTreeSet;

/// Function names a contract may neither export nor be called through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservedFunctions {
    names: BTreeSet<String>,
}

impl ReservedFunctions {
    /// Import names, protocol built-ins and the upgrade entry point.
    pub fn new<'a>(
        import_names: impl IntoIterator<Item = &'a str>,
        protocol_builtins: &BTreeSet<String>,
    ) -> Self {
        let mut names: BTreeSet<String> = import_names.into_iter().map(str::to_string).collect();
        names.extend(protocol_builtins.iter().cloned());
        names.insert(UPGRADE_FUNCTION_NAME.to_string());
        Self { names }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
