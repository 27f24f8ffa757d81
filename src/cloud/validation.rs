//! Checks a command must pass before anything goes on the wire.

use serde_json::{json, Value};

use super::command::CloudCommand;
use crate::error::{HabitatError, Result};
use crate::models::ProjectDocument;
use crate::store::LocaleAddress;

pub fn validate(command: &CloudCommand) -> Result<()> {
    match command {
        CloudCommand::UpdateProject { project_data } => validate_project_data(project_data),
        _ => Ok(()),
    }
}

/// An update must name its locale and project and carry both halves of the payload.
///
/// The locale has to be a usable local name; `frame` and `object` are looked up under
/// `data`, the way a stored document keeps them.
pub fn validate_project_data(project_data: &Value) -> Result<()> {
    let mut missing = Vec::new();

    let locale_ok = project_data
        .get("locale")
        .and_then(Value::as_str)
        .is_some_and(|locale| matches!(LocaleAddress::parse(locale), Ok(LocaleAddress::Local(_))));
    if !locale_ok {
        missing.push("locale");
    }

    let name_ok = project_data
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty());
    if !name_ok {
        missing.push("name");
    }

    let data = project_data.get("data");
    for part in ["frame", "object"] {
        if !data.and_then(|data| data.get(part)).is_some_and(Value::is_object) {
            missing.push(part);
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(HabitatError::IncompleteProject { missing })
    }
}

/// The `projectData` an update sends for a stored document: the document itself, named by
/// its id.
pub fn project_data(doc: &ProjectDocument) -> Result<Value> {
    let mut value = serde_json::to_value(doc)?;
    if let Value::Object(map) = &mut value {
        map.insert("name".into(), json!(doc.id));
    }
    Ok(value)
}
