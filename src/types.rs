//! Core types for bulk-assign

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Well-known Intune id of the "all users" pseudo-group
pub const ALL_USERS_ID: &str = "acacacac-9df4-4c7d-9d50-4ef0226f57a9";

/// Well-known Intune id of the "all devices" pseudo-group
pub const ALL_DEVICES_ID: &str = "adadadad-808e-44e2-905a-0b7873a8a531";

fn guid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .expect("hardcoded GUID pattern is valid")
    })
}

/// Check that a string is a Graph object id (GUID)
pub fn is_guid(value: &str) -> bool {
    guid_regex().is_match(value)
}

/// Kind of artifact being assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// Mobile app (`deviceAppManagement/mobileApps`)
    App,
    /// Legacy configuration profile (`deviceManagement/deviceConfigurations`)
    DeviceConfiguration,
    /// Settings catalog policy (`deviceManagement/configurationPolicies`)
    ConfigurationPolicy,
    /// Compliance policy (`deviceManagement/deviceCompliancePolicies`)
    CompliancePolicy,
}

impl ArtifactKind {
    /// Graph collection holding artifacts of this kind
    pub const fn collection_path(self) -> &'static str {
        match self {
            Self::App => "/deviceAppManagement/mobileApps",
            Self::DeviceConfiguration => "/deviceManagement/deviceConfigurations",
            Self::ConfigurationPolicy => "/deviceManagement/configurationPolicies",
            Self::CompliancePolicy => "/deviceManagement/deviceCompliancePolicies",
        }
    }

    /// Only app assignments carry an install intent
    pub const fn supports_intent(self) -> bool {
        matches!(self, Self::App)
    }

    /// Intent used when the caller does not pick one
    pub const fn default_intent(self) -> Intent {
        if self.supports_intent() {
            Intent::Required
        } else {
            Intent::Apply
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::App => "app",
            Self::DeviceConfiguration => "device-configuration",
            Self::ConfigurationPolicy => "configuration-policy",
            Self::CompliancePolicy => "compliance-policy",
        };
        f.write_str(s)
    }
}

impl FromStr for ArtifactKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "app" => Ok(Self::App),
            "device-configuration" | "profile" => Ok(Self::DeviceConfiguration),
            "configuration-policy" | "settings-catalog" => Ok(Self::ConfigurationPolicy),
            "compliance-policy" | "compliance" => Ok(Self::CompliancePolicy),
            other => Err(Error::InvalidInput(format!("unknown artifact kind: {other}"))),
        }
    }
}

/// Deployment semantics requested for an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    /// Install automatically
    Required,
    /// Offer in the company portal
    Available,
    /// Offer to unenrolled devices
    AvailableWithoutEnrollment,
    /// Remove from targeted devices
    Uninstall,
    /// Apply a policy or profile (non-app artifacts)
    Apply,
}

impl Intent {
    /// Wire value for `mobileAppAssignment.intent`, `None` for policies
    pub const fn as_graph_str(self) -> Option<&'static str> {
        match self {
            Self::Required => Some("required"),
            Self::Available => Some("available"),
            Self::AvailableWithoutEnrollment => Some("availableWithoutEnrollment"),
            Self::Uninstall => Some("uninstall"),
            Self::Apply => None,
        }
    }

    /// Parse the wire value of `mobileAppAssignment.intent`
    pub fn from_graph_str(value: &str) -> Option<Self> {
        match value {
            "required" => Some(Self::Required),
            "available" => Some(Self::Available),
            "availableWithoutEnrollment" => Some(Self::AvailableWithoutEnrollment),
            "uninstall" => Some(Self::Uninstall),
            _ => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Required => "required",
            Self::Available => "available",
            Self::AvailableWithoutEnrollment => "available-without-enrollment",
            Self::Uninstall => "uninstall",
            Self::Apply => "apply",
        };
        f.write_str(s)
    }
}

impl FromStr for Intent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "required" => Ok(Self::Required),
            "available" => Ok(Self::Available),
            "available-without-enrollment" => Ok(Self::AvailableWithoutEnrollment),
            "uninstall" => Ok(Self::Uninstall),
            "apply" => Ok(Self::Apply),
            other => Err(Error::InvalidInput(format!("unknown intent: {other}"))),
        }
    }
}

/// The group (or pseudo-group) an artifact is assigned to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "kebab-case")]
pub enum AssignmentTarget {
    /// Include an Entra ID group
    Group(String),
    /// Exclude an Entra ID group
    ExclusionGroup(String),
    /// All licensed users
    AllUsers,
    /// All devices
    AllDevices,
}

impl AssignmentTarget {
    /// Build an include target from a group id, normalising the well-known
    /// pseudo-group ids
    pub fn from_group_id(id: &str) -> Self {
        if id.eq_ignore_ascii_case(ALL_USERS_ID) {
            Self::AllUsers
        } else if id.eq_ignore_ascii_case(ALL_DEVICES_ID) {
            Self::AllDevices
        } else {
            Self::Group(id.to_ascii_lowercase())
        }
    }

    /// Parse a CLI target: `all-users`, `all-devices`, `exclude:<id>` or `<id>`
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "all-users" => return Ok(Self::AllUsers),
            "all-devices" => return Ok(Self::AllDevices),
            _ => {}
        }

        if let Some(id) = value.strip_prefix("exclude:") {
            if !is_guid(id) {
                return Err(Error::InvalidInput(format!("not a group id: {id}")));
            }
            return Ok(Self::ExclusionGroup(id.to_ascii_lowercase()));
        }

        if !is_guid(value) {
            return Err(Error::InvalidInput(format!(
                "not a group id or pseudo-target: {value}"
            )));
        }
        Ok(Self::from_group_id(value))
    }

    /// Target id; pseudo-targets report their well-known id
    pub fn id(&self) -> &str {
        match self {
            Self::Group(id) | Self::ExclusionGroup(id) => id,
            Self::AllUsers => ALL_USERS_ID,
            Self::AllDevices => ALL_DEVICES_ID,
        }
    }

    /// Whether this is one of the built-in pseudo-groups
    pub const fn is_pseudo(&self) -> bool {
        matches!(self, Self::AllUsers | Self::AllDevices)
    }
}

impl fmt::Display for AssignmentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(id) => write!(f, "{id}"),
            Self::ExclusionGroup(id) => write!(f, "exclude:{id}"),
            Self::AllUsers => f.write_str("all-users"),
            Self::AllDevices => f.write_str("all-devices"),
        }
    }
}

impl FromStr for AssignmentTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// How an assignment filter narrows the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Only devices matching the filter
    Include,
    /// All devices except those matching the filter
    Exclude,
}

impl FromStr for FilterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "include" => Ok(Self::Include),
            "exclude" => Ok(Self::Exclude),
            other => Err(Error::InvalidInput(format!("unknown filter mode: {other}"))),
        }
    }
}

/// Assignment filter attached to a target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentFilter {
    /// Filter id
    pub id: String,
    /// Include or exclude matching devices
    pub mode: FilterMode,
}

/// Reference to an artifact in the tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Graph object id
    pub id: String,
    /// Display name (may equal the id when unknown)
    pub name: String,
    /// Which collection the artifact lives in
    pub kind: ArtifactKind,
}

impl ArtifactRef {
    /// Create an artifact reference
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }
}

/// An assignment already present on the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingAssignment {
    /// Assignment id
    pub id: String,
    /// Assigned target
    pub target: AssignmentTarget,
    /// Assigned intent (`Apply` for policies)
    pub intent: Intent,
    /// Filter, if any
    pub filter: Option<AssignmentFilter>,
}

/// Lifecycle of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Not yet sent
    Pending,
    /// Sent, awaiting a response
    Submitted,
    /// Waiting for a retry (backoff or rate limit)
    Retrying,
    /// Remote state matches the request
    Completed,
    /// Permanently failed
    Failed,
    /// Abandoned because the run was cancelled
    Cancelled,
}

impl ItemStatus {
    /// Whether no further transitions can happen
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why an item ended up `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// 400: the artifact/target combination is invalid
    InvalidRequest,
    /// 403: the caller lacks permission
    Forbidden,
    /// 404: artifact or target no longer exists
    NotFound,
    /// Transient failures persisted past the retry budget
    ExhaustedRetries,
    /// The batch could not be delivered at all
    Transport,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidRequest => "invalid request",
            Self::Forbidden => "insufficient permission",
            Self::NotFound => "artifact or target no longer exists",
            Self::ExhaustedRetries => "retries exhausted",
            Self::Transport => "transport failure",
        };
        f.write_str(s)
    }
}

/// The atomic unit of work: one artifact assigned to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Artifact id
    pub artifact_id: String,
    /// Artifact display name
    pub artifact_name: String,
    /// Artifact collection
    pub artifact_kind: ArtifactKind,
    /// Assignment target
    pub target: AssignmentTarget,
    /// Target display name
    pub target_name: String,
    /// Requested intent
    pub intent: Intent,
    /// Optional assignment filter
    pub filter: Option<AssignmentFilter>,
    /// Lifecycle status
    pub status: ItemStatus,
    /// Transient-failure retries spent
    pub attempt_count: u32,
    /// Last diagnostic message
    pub last_error: Option<String>,
    /// Failure classification, set when `status == Failed`
    pub failure_kind: Option<FailureKind>,
    /// When the item reached `completed`
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Create a pending work item
    pub fn new(artifact: &ArtifactRef, target: AssignmentTarget, intent: Intent) -> Self {
        Self {
            artifact_id: artifact.id.clone(),
            artifact_name: artifact.name.clone(),
            artifact_kind: artifact.kind,
            target_name: target.to_string(),
            target,
            intent,
            filter: None,
            status: ItemStatus::Pending,
            attempt_count: 0,
            last_error: None,
            failure_kind: None,
            completed_at: None,
        }
    }

    /// Attach an assignment filter
    #[must_use]
    pub fn with_filter(mut self, filter: AssignmentFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Override the target display name
    #[must_use]
    pub fn with_target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = name.into();
        self
    }

    /// Artifact reference this item belongs to
    pub fn artifact(&self) -> ArtifactRef {
        ArtifactRef::new(&self.artifact_id, &self.artifact_name, self.artifact_kind)
    }

    /// Short label for logs and reports
    pub fn label(&self) -> String {
        format!("{} -> {}", self.artifact_name, self.target_name)
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.status = ItemStatus::Submitted;
    }

    pub(crate) fn mark_retrying(&mut self) {
        self.status = ItemStatus::Retrying;
    }

    pub(crate) fn mark_completed(&mut self, note: Option<&str>) {
        self.status = ItemStatus::Completed;
        self.last_error = note.map(ToString::to_string);
        self.failure_kind = None;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, kind: FailureKind, message: String) {
        self.status = ItemStatus::Failed;
        self.failure_kind = Some(kind);
        self.last_error = Some(message);
    }

    /// Downgrade an unfinished item to `cancelled`; final items are untouched
    pub(crate) fn mark_cancelled(&mut self) {
        if !self.status.is_final() {
            self.status = ItemStatus::Cancelled;
            self.last_error = Some("cancelled".to_string());
        }
    }
}

/// Build the work list for every artifact x target pair
///
/// Items come out artifact-major, in the order given.
pub fn cross_product(
    artifacts: &[ArtifactRef],
    targets: &[AssignmentTarget],
    intent: Intent,
    filter: Option<&AssignmentFilter>,
) -> Vec<WorkItem> {
    artifacts
        .iter()
        .flat_map(|artifact| {
            targets.iter().map(move |target| {
                let item = WorkItem::new(artifact, target.clone(), intent);
                match filter {
                    Some(f) => item.with_filter(f.clone()),
                    None => item,
                }
            })
        })
        .collect()
}
