//! Raw request parameters and their normalization into typed predicates
//! plus control directives.

pub mod convert;
pub mod normalize;
pub mod predicate;
pub mod raw;

pub use normalize::{GROUP_OP_PREFIX, RESERVED_KEYS, Specials, normalize, normalize_map};
pub use predicate::{Operator, Predicates};
pub use raw::RawParams;
