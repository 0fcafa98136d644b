use serde::Serialize;

use crate::frame::{FrameType, ProductType};

/// Parameter bag the dispatcher hands to every stage of a frame's recipe.
///
/// Set once when the frame is planned and carried unchanged along the chain.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StageParams {
    pub groupid: Option<String>,
    /// Source frame type a stack is built from.
    pub want_type: Option<FrameType>,
    /// Intermediate stack product, for recipes that stack before the master.
    pub stack_type: Option<ProductType>,
    /// Type of the derived product.
    pub new_type: Option<ProductType>,
    pub new_file_name: Option<String>,
    /// Group membership required before a stack may be built.
    pub min_files: Option<usize>,
    /// Output directory tag.
    pub in_directory: Option<String>,
}

impl StageParams {
    pub fn for_group(group: impl Into<String>) -> Self {
        Self {
            groupid: Some(group.into()),
            ..Self::default()
        }
    }
}
