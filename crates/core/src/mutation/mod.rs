pub mod diff;
pub mod types;

pub use diff::render_patch_diff;
pub use types::{
    json_eq, CommitReceipt, FieldPath, PatchMutation, PatchOperations, PatchValue, RecordPatch,
    WriteGroup,
};
