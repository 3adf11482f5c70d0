use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::TradeLabel;

/// Maps labels to output-class indices and back. The order is fixed and
/// persisted with the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCodec {
    classes: Vec<TradeLabel>,
}

impl LabelCodec {
    /// The three known labels in lexicographic order, whatever subset the
    /// training data happens to contain
    pub fn standard() -> Self {
        let classes: BTreeSet<TradeLabel> = TradeLabel::ALL.into_iter().collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn classes(&self) -> &[TradeLabel] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, label: TradeLabel) -> Option<usize> {
        self.classes.iter().position(|c| *c == label)
    }

    pub fn decode(&self, index: usize) -> Option<TradeLabel> {
        self.classes.get(index).copied()
    }

    /// Holds each known label exactly once
    pub fn is_consistent(&self) -> bool {
        let distinct: BTreeSet<_> = self.classes.iter().collect();
        self.classes.len() == TradeLabel::ALL.len() && distinct.len() == self.classes.len()
    }
}

impl Default for LabelCodec {
    fn default() -> Self {
        Self::standard()
    }
}
