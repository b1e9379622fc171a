use serde::{Deserialize, Serialize};

/// Identity of the operator watching the mesh.
///
/// Credentials are checked upstream; the kernel only carries who is
/// logged in and hands this object to the consumers that need it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorSession {
    pub username: String,
    pub full_name: String,
    pub role: String,
}

impl Default for OperatorSession {
    fn default() -> Self {
        Self {
            username: "operator".into(),
            full_name: "Mesh Operator".into(),
            role: "viewer".into(),
        }
    }
}

impl OperatorSession {
    pub fn greeting(&self) -> String {
        format!("Welcome, {} (logged in as {})", self.full_name, self.role)
    }
}
