//! Graph request bodies and assignment parsing

use crate::remote::SubRequest;
use crate::types::{
    ArtifactKind, AssignmentFilter, AssignmentTarget, ExistingAssignment, FilterMode, Intent,
    WorkItem,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

const GROUP_TARGET: &str = "#microsoft.graph.groupAssignmentTarget";
const EXCLUSION_TARGET: &str = "#microsoft.graph.exclusionGroupAssignmentTarget";
const ALL_USERS_TARGET: &str = "#microsoft.graph.allLicensedUsersAssignmentTarget";
const ALL_DEVICES_TARGET: &str = "#microsoft.graph.allDevicesAssignmentTarget";
const APP_ASSIGNMENT: &str = "#microsoft.graph.mobileAppAssignment";

/// Path of an artifact's assignment collection
pub(crate) fn assignments_path(kind: ArtifactKind, artifact_id: &str) -> String {
    format!(
        "{}/{}/assignments",
        kind.collection_path(),
        urlencoding::encode(artifact_id)
    )
}

/// Build the create-assignment sub-request for a work item
pub fn assignment_request(item: &WorkItem, id: impl Into<String>) -> SubRequest {
    let mut body = Map::new();
    if item.artifact_kind.supports_intent() {
        body.insert("@odata.type".into(), json!(APP_ASSIGNMENT));
        if let Some(intent) = item.intent.as_graph_str() {
            body.insert("intent".into(), json!(intent));
        }
    }
    body.insert(
        "target".into(),
        target_json(&item.target, item.filter.as_ref()),
    );

    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    SubRequest {
        id: id.into(),
        method: "POST".to_string(),
        url: assignments_path(item.artifact_kind, &item.artifact_id),
        body: Some(Value::Object(body)),
        headers,
    }
}

fn target_json(target: &AssignmentTarget, filter: Option<&AssignmentFilter>) -> Value {
    let mut obj = Map::new();
    match target {
        AssignmentTarget::Group(id) => {
            obj.insert("@odata.type".into(), json!(GROUP_TARGET));
            obj.insert("groupId".into(), json!(id));
        }
        AssignmentTarget::ExclusionGroup(id) => {
            obj.insert("@odata.type".into(), json!(EXCLUSION_TARGET));
            obj.insert("groupId".into(), json!(id));
        }
        AssignmentTarget::AllUsers => {
            obj.insert("@odata.type".into(), json!(ALL_USERS_TARGET));
        }
        AssignmentTarget::AllDevices => {
            obj.insert("@odata.type".into(), json!(ALL_DEVICES_TARGET));
        }
    }

    // Exclusion targets cannot carry filters
    if let Some(f) = filter.filter(|_| !matches!(target, AssignmentTarget::ExclusionGroup(_))) {
        let mode = match f.mode {
            FilterMode::Include => "include",
            FilterMode::Exclude => "exclude",
        };
        obj.insert(
            "deviceAndAppManagementAssignmentFilterId".into(),
            json!(f.id),
        );
        obj.insert(
            "deviceAndAppManagementAssignmentFilterType".into(),
            json!(mode),
        );
    }

    Value::Object(obj)
}

/// Parse one element of an `.../assignments` listing
///
/// Returns `None` for target types this tool does not manage.
pub fn parse_assignment(value: &Value) -> Option<ExistingAssignment> {
    let id = value.get("id")?.as_str()?.to_string();
    let target_obj = value.get("target")?;
    let odata_type = target_obj.get("@odata.type")?.as_str()?;
    let group_id = || target_obj.get("groupId").and_then(Value::as_str);

    let target = match odata_type {
        GROUP_TARGET => AssignmentTarget::from_group_id(group_id()?),
        EXCLUSION_TARGET => AssignmentTarget::ExclusionGroup(group_id()?.to_ascii_lowercase()),
        ALL_USERS_TARGET => AssignmentTarget::AllUsers,
        ALL_DEVICES_TARGET => AssignmentTarget::AllDevices,
        _ => return None,
    };

    let intent = value
        .get("intent")
        .and_then(Value::as_str)
        .and_then(Intent::from_graph_str)
        .unwrap_or(Intent::Apply);

    let filter_id = target_obj
        .get("deviceAndAppManagementAssignmentFilterId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let filter_mode = match target_obj
        .get("deviceAndAppManagementAssignmentFilterType")
        .and_then(Value::as_str)
    {
        Some("include") => Some(FilterMode::Include),
        Some("exclude") => Some(FilterMode::Exclude),
        _ => None,
    };
    let filter = filter_id.zip(filter_mode).map(|(id, mode)| AssignmentFilter {
        id: id.to_string(),
        mode,
    });

    Some(ExistingAssignment {
        id,
        target,
        intent,
        filter,
    })
}
