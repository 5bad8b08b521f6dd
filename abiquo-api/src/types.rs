//! Type definitions for the Abiquo resources observed by the monitors.
//!
//! Field names follow the JSON representation served by the Abiquo API
//! (camelCase fields, SCREAMING_SNAKE_CASE enum values).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media type of a single task.
pub const TASK_MEDIA_TYPE: &str = "application/vnd.abiquo.task+json";
/// Media type of a task collection.
pub const TASKS_MEDIA_TYPE: &str = "application/vnd.abiquo.tasks+json";
/// Media type of a virtual machine state document.
pub const VM_STATE_MEDIA_TYPE: &str = "application/vnd.abiquo.virtualmachinestate+json";

/// Relation of the link pointing at the resource itself.
pub const REL_SELF: &str = "self";
/// Relation of the link pointing at the resource owning a task.
pub const REL_PARENT: &str = "parent";

// =============================================================================
// LINKS
// =============================================================================

/// A REST link between resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
            media_type: None,
            title: None,
        }
    }

    /// Set the media type.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

fn find_link<'a>(links: &'a [Link], rel: &str) -> Option<&'a Link> {
    links.iter().find(|l| l.rel == rel)
}

// =============================================================================
// TASKS
// =============================================================================

/// State of an asynchronous task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Started,
    FinishedSuccessfully,
    FinishedUnsuccessfully,
}

impl TaskState {
    /// Check if the task will not change state anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::FinishedSuccessfully | TaskState::FinishedUnsuccessfully)
    }

    /// Check if the task finished without errors.
    pub fn is_successful(&self) -> bool {
        *self == TaskState::FinishedSuccessfully
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::FinishedSuccessfully => "FINISHED_SUCCESSFULLY",
            TaskState::FinishedUnsuccessfully => "FINISHED_UNSUCCESSFULLY",
        };
        f.write_str(s)
    }
}

/// Operation an asynchronous task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Deploy,
    Undeploy,
    Reconfigure,
    PowerOn,
    PowerOff,
    Pause,
    Resume,
    Reset,
    Snapshot,
    Instance,
    /// Any task type this client does not know about
    #[serde(other)]
    Unknown,
}

/// State of a single job inside a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Started,
    Done,
    Failed,
    RollbackDone,
    RollbackFailed,
    #[serde(other)]
    Unknown,
}

/// A step of an asynchronous task. Jobs are reported, not monitored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    pub state: JobState,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// An asynchronous operation running on the Abiquo server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncTask {
    /// Unique identifier assigned by the server
    pub task_id: String,
    /// Identifier of the resource the task operates on
    #[serde(default)]
    pub owner_id: String,
    /// User that submitted the task
    #[serde(default)]
    pub user_id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub state: TaskState,
    #[serde(default, with = "collection")]
    pub jobs: Vec<Job>,
    /// Creation time, milliseconds since the epoch
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl AsyncTask {
    /// Create a pending task. Mostly useful for tests and fixtures.
    pub fn new(task_id: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            task_id: task_id.into(),
            owner_id: String::new(),
            user_id: String::new(),
            task_type,
            state: TaskState::Pending,
            jobs: Vec::new(),
            timestamp: Utc::now().timestamp_millis(),
            links: Vec::new(),
        }
    }

    /// Set the owner identifier.
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    /// Set the state.
    pub fn with_state(mut self, state: TaskState) -> Self {
        self.state = state;
        self
    }

    /// Add a link.
    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Add a job.
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// Find a link by relation.
    pub fn link(&self, rel: &str) -> Option<&Link> {
        find_link(&self.links, rel)
    }

    /// Link used to re-fetch this task.
    pub fn self_link(&self) -> Option<&Link> {
        self.link(REL_SELF)
    }

    /// Creation time, if the server reported one.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        if self.timestamp <= 0 {
            return None;
        }
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Jobs that ended in failure.
    pub fn failed_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs
            .iter()
            .filter(|j| matches!(j.state, JobState::Failed | JobState::RollbackFailed))
    }
}

/// A page of tasks as returned by `<owner>/tasks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncTasks {
    #[serde(default)]
    pub collection: Vec<AsyncTask>,
    #[serde(default)]
    pub total_size: Option<u64>,
}

// =============================================================================
// VIRTUAL MACHINES
// =============================================================================

/// Power and allocation state of a virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VirtualMachineState {
    NotAllocated,
    Allocated,
    Configured,
    On,
    Paused,
    Off,
    Locked,
    Unknown,
}

impl fmt::Display for VirtualMachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VirtualMachineState::NotAllocated => "NOT_ALLOCATED",
            VirtualMachineState::Allocated => "ALLOCATED",
            VirtualMachineState::Configured => "CONFIGURED",
            VirtualMachineState::On => "ON",
            VirtualMachineState::Paused => "PAUSED",
            VirtualMachineState::Off => "OFF",
            VirtualMachineState::Locked => "LOCKED",
            VirtualMachineState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Body of `<virtual machine>/state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineStateDto {
    pub state: VirtualMachineState,
}

/// A virtual machine inside a virtual appliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    pub id: u32,
    pub name: String,
    /// Last state observed when the resource was read
    pub state: VirtualMachineState,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl VirtualMachine {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: VirtualMachineState::NotAllocated,
            links: Vec::new(),
        }
    }

    /// Add a link.
    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Link used to re-fetch this virtual machine.
    pub fn self_link(&self) -> Option<&Link> {
        find_link(&self.links, REL_SELF)
    }
}

/// Abiquo wraps nested lists as `{"collection": [...]}`.
mod collection {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct WrapperRef<'a, T> {
        collection: &'a [T],
    }

    #[derive(Deserialize)]
    struct Wrapper<T> {
        #[serde(default = "Vec::new")]
        collection: Vec<T>,
    }

    pub fn serialize<S, T>(items: &[T], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        WrapperRef { collection: items }.serialize(serializer)
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Wrapper::<T>::deserialize(deserializer)?.collection)
    }
}
