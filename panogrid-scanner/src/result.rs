use panogrid_core::PanoNode;
use serde::{Deserialize, Serialize};

/// Normalised outcome of one panorama lookup.
///
/// `node` may be absent while `links` still point somewhere useful, e.g. a
/// multi-level panorama seen from the wrong floor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanoResult {
    pub node: Option<PanoNode>,
    pub links: Vec<String>,
}

impl PanoResult {
    pub fn new(node: PanoNode, links: Vec<String>) -> Self {
        Self {
            node: Some(node),
            links,
        }
    }

    pub fn redirect(links: Vec<String>) -> Self {
        Self { node: None, links }
    }
}
