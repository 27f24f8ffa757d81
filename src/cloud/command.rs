use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{HabitatError, Result};

/// The closed set of commands the cloud's command endpoint understands.
///
/// Serializes to the wire body's `cmd` tag plus the command's own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CloudCommand {
    GetLoginIdentity,
    CreateLocale { locale: String },
    DeleteLocale { locale: String },
    CreateProject { locale: String, project: String },
    DeleteProject { locale: String, project: String },
    ListProjects { locale: String },
    PublishProject { locale: String, project: String },
    LoadProject { locale: String, project: String },
    /// The remote copy after the cloud applied its own conflict resolution.
    LoadProjectResolved { locale: String, project: String },
    UpdateProject {
        /// Absent counts as empty, so validation can name every missing part.
        #[serde(default)]
        project_data: Value,
    },
    Query { locale: String, query: Value },
}

impl CloudCommand {
    pub const NAMES: [&'static str; 11] = [
        "getLoginIdentity",
        "createLocale",
        "deleteLocale",
        "createProject",
        "deleteProject",
        "listProjects",
        "publishProject",
        "loadProject",
        "loadProjectResolved",
        "updateProject",
        "query",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CloudCommand::GetLoginIdentity => "getLoginIdentity",
            CloudCommand::CreateLocale { .. } => "createLocale",
            CloudCommand::DeleteLocale { .. } => "deleteLocale",
            CloudCommand::CreateProject { .. } => "createProject",
            CloudCommand::DeleteProject { .. } => "deleteProject",
            CloudCommand::ListProjects { .. } => "listProjects",
            CloudCommand::PublishProject { .. } => "publishProject",
            CloudCommand::LoadProject { .. } => "loadProject",
            CloudCommand::LoadProjectResolved { .. } => "loadProjectResolved",
            CloudCommand::UpdateProject { .. } => "updateProject",
            CloudCommand::Query { .. } => "query",
        }
    }

    /// Builds a command from its wire name and an argument object.
    pub fn from_named(name: &str, args: Value) -> Result<Self> {
        if !Self::NAMES.contains(&name) {
            return Err(HabitatError::UnknownCommand(name.to_string()));
        }

        let mut body = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(HabitatError::InvalidArguments {
                    command: name.to_string(),
                    reason: format!("expected an object, got {other}"),
                })
            }
        };
        body.insert("cmd".into(), Value::String(name.to_string()));
        serde_json::from_value(Value::Object(body)).map_err(|err| HabitatError::InvalidArguments {
            command: name.to_string(),
            reason: err.to_string(),
        })
    }

    /// Whether the command needs a live session. The identity query is how a caller finds
    /// out who it is, so it goes out as is.
    pub fn requires_session(&self) -> bool {
        !matches!(self, CloudCommand::GetLoginIdentity)
    }

    /// The human-readable `name` field of the request body.
    pub fn describe(&self) -> String {
        match self {
            CloudCommand::GetLoginIdentity => "get login identity".into(),
            CloudCommand::CreateLocale { locale } => format!("create locale: {locale}"),
            CloudCommand::DeleteLocale { locale } => format!("delete locale: {locale}"),
            CloudCommand::CreateProject { locale, project } => {
                format!("create project: {locale}:{project}")
            }
            CloudCommand::DeleteProject { locale, project } => {
                format!("delete project: {locale}:{project}")
            }
            CloudCommand::ListProjects { locale } => format!("list projects: {locale}"),
            CloudCommand::PublishProject { locale, project } => {
                format!("publish project: {locale}:{project}")
            }
            CloudCommand::LoadProject { locale, project } => {
                format!("load project: {locale}:{project}")
            }
            CloudCommand::LoadProjectResolved { locale, project } => {
                format!("load resolved project: {locale}:{project}")
            }
            CloudCommand::UpdateProject { project_data } => {
                let label = project_data
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("unnamed");
                format!("update project: {label}")
            }
            CloudCommand::Query { locale, .. } => format!("query: {locale}"),
        }
    }

    /// `{name, cmd, ...fields, json: true}`
    pub fn to_body(&self) -> Result<Value> {
        let mut body = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            other => {
                return Err(HabitatError::InvalidArguments {
                    command: self.name().to_string(),
                    reason: format!("serialized to a non-object: {other}"),
                })
            }
        };
        body.insert("name".into(), Value::String(self.describe()));
        body.insert("json".into(), Value::Bool(true));
        Ok(Value::Object(body))
    }
}
