use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};

/// A record of a long running request against a cluster.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub code: OperationCode,
}

crate::impl_display_as_json!(Operation);

#[derive(Serialize, Deserialize, Debug, Default, Eq, PartialEq, Clone, Copy)]
pub enum OperationCode {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

derive_fromstr_from_deserialize!(OperationCode, |e| -> crate::Error {
    crate::error::OpaqueError::SerdePlain { source: e }.into()
});
derive_display_from_serialize!(OperationCode);

impl Operation {
    pub fn new<S: Into<String>>(user_id: i64, cluster_id: S) -> Self {
        Self {
            id: 0,
            user_id,
            cluster_id: cluster_id.into(),
            code: OperationCode::Pending,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.code, OperationCode::Done | OperationCode::Failed)
    }
}
