//! Raw SQL fragments
//!
//! Caller code can only create a fragment from a `&'static str`, i.e. SQL that
//! was written into the program. The crate composes further fragments from
//! quoted identifiers it has checked against the catalog. A runtime `String`
//! from a request has no way in.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment(String);

impl SqlFragment {
    /// A fragment written into the program, e.g. `"COUNT(e.id)"`
    pub fn from_static(sql: &'static str) -> Self {
        Self(sql.to_string())
    }

    pub(crate) fn composed(sql: String) -> Self {
        Self(sql)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
