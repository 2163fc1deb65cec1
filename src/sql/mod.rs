//! SQL generation
//!
//! Identifier quoting, parameter allocation, filter compilation, page planning
//! and write statements. Identifiers are always resolved against live table
//! descriptors and quoted; values are always bound.

pub mod filter;
pub mod fragment;
pub mod page;
pub mod params;
pub mod sanitize;
pub mod shape;
pub mod write;

pub use filter::{FilterOperator, FilterSpec, Filters, compile_filters};
pub use fragment::SqlFragment;
pub use page::{
    OrderDirection, PageLimits, PagePlan, PageRequest, PageResult, Pagination, QueryBase,
    build_page, resolve_order,
};
pub use params::{Params, SqlParam, bind_params};
pub use sanitize::{POSTGRES_RESERVED_WORDS, quote_identifier, validate_identifier};
pub use shape::{ColumnScope, Join, JoinKind, QueryShape, SelectItem};
pub use write::WriteStatement;
