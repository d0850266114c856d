use crossbeam_channel::{unbounded, Receiver, Sender};
use time::Date;

use crate::result::{err_msg, Result};

/// Visibility of an imported video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoPrivacy {
    #[default]
    Public,
    Unlisted,
    Private,
}

/// One unit of import work for one external URL.
///
/// Built by the sync orchestrator; ownership transfers to the job queue
/// on submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportJob {
    pub channel_id: i64,
    pub user_id: i64,
    pub target_url: String,
    pub sync_session_id: Option<i64>,
    pub privacy: VideoPrivacy,
    pub published_at_override: Option<Date>,
}

/// Parent job finalizing a channel import once every child settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeJob {
    pub channel_id: i64,
    pub sync_session_id: Option<i64>,
}

/// One submitted batch: a parent deferred until all children settle
#[derive(Debug, Clone, PartialEq)]
pub struct JobGraph {
    pub parent: FinalizeJob,
    pub children: Vec<ImportJob>,
}

/// Job queue collaborator contract.
///
/// The queue guarantees that the parent executes only after all children
/// settle (success or failure), and that submission is effectively atomic
/// as a batch.
pub trait JobQueue {
    fn create_job_with_children(&self, parent: FinalizeJob, children: Vec<ImportJob>)
        -> Result<()>;
}

/// In-process queue handing whole batches to a worker over a channel.
///
/// Execution ordering (children before parent) is the worker's side of
/// the contract; a batch is never split across workers.
#[derive(Debug)]
pub struct ChannelJobQueue {
    sender: Sender<JobGraph>,
}

impl ChannelJobQueue {
    pub fn new() -> (Self, Receiver<JobGraph>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl JobQueue for ChannelJobQueue {
    fn create_job_with_children(
        &self,
        parent: FinalizeJob,
        children: Vec<ImportJob>,
    ) -> Result<()> {
        self.sender
            .send(JobGraph { parent, children })
            .map_err(|_| err_msg("Job queue worker is gone"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privacy_defaults_to_public() {
        assert_eq!(VideoPrivacy::default(), VideoPrivacy::Public);
    }

    #[test]
    fn a_batch_is_delivered_whole() {
        let (queue, receiver) = ChannelJobQueue::new();

        let parent = FinalizeJob {
            channel_id: 1,
            sync_session_id: Some(3),
        };
        let child = ImportJob {
            channel_id: 1,
            user_id: 2,
            target_url: "https://example.com/w/42".to_string(),
            sync_session_id: Some(3),
            privacy: VideoPrivacy::default(),
            published_at_override: None,
        };

        queue
            .create_job_with_children(parent.clone(), vec![child.clone()])
            .unwrap();
        drop(queue);

        let batches: Vec<JobGraph> = receiver.iter().collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].parent, parent);
        assert_eq!(batches[0].children, vec![child]);
    }
}
