use serde::{Deserialize, Serialize};
use serde_plain::derive_display_from_serialize;
use std::fmt::{Display, Formatter};

#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
pub enum ActionType {
    Add,
    Update,
    Delete,
    Nop,
}

derive_display_from_serialize!(ActionType);

/// A change that an apply made, or would make during a dry run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action: ActionType,
    pub resource: String,
    pub message: String,
}

impl Action {
    pub fn new<S1, S2>(action: ActionType, resource: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            action,
            resource: resource.into(),
            message: message.into(),
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.action, self.resource, self.message)
    }
}
