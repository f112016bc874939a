//! Batch identity: schedule code parsing and display code allocation

pub mod allocator;
pub mod code;

pub use allocator::{
    allocate_display_codes, candidate_codes, ordinal_suffix, probe_code, suffixed_code, CodeCandidate,
    CodeProbe,
};
pub use code::{
    is_valid_batch_code, parse_batch_code, supported_day_codes, weekday_name, BatchCodeError, ClassTime,
    ParsedBatchCode,
};
