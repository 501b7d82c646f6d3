//! Notification dispatch
//!
//! The engine decides *when* to notify; delivery transports (email, chat,
//! webhooks) live behind the sink trait. Dispatch failures are logged and
//! never re-raised into a run's status.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use convoy_core::domain::pipeline::{NotificationRule, Pipeline, RunEvent};
use convoy_core::domain::run::PipelineRun;

/// One notification routed to a channel
#[derive(Debug, Clone)]
pub struct Notification {
    pub run_id: Uuid,
    pub pipeline_id: Uuid,
    pub pipeline_name: String,
    pub event: RunEvent,
    pub channel: String,
    pub recipients: Vec<String>,
    pub message: String,
}

/// Delivery failure reported by a sink
#[derive(Debug, Error)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// Transport seam for notification delivery
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, note: Notification) -> std::result::Result<(), NotifyError>;
}

/// Built-in sink that records notifications in the diagnostic log
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn send(&self, note: Notification) -> std::result::Result<(), NotifyError> {
        info!(
            "notify {} [{:?}] pipeline '{}' run {}: {}",
            note.channel, note.event, note.pipeline_name, note.run_id, note.message
        );
        Ok(())
    }
}

/// Builds the notifications for the rules matching an event
pub fn notifications_for(
    run: &PipelineRun,
    pipeline: &Pipeline,
    event: RunEvent,
) -> Vec<Notification> {
    pipeline
        .config
        .notifications
        .iter()
        .filter(|rule| rule.matches(event))
        .map(|rule: &NotificationRule| Notification {
            run_id: run.id,
            pipeline_id: pipeline.id,
            pipeline_name: pipeline.name.clone(),
            event,
            channel: rule.channel.clone(),
            recipients: rule.recipients.clone(),
            message: format!("run {} of pipeline '{}': {:?}", run.id, pipeline.name, event),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::domain::pipeline::{PipelineConfig, PipelineStatus, TriggerConfig};
    use convoy_core::domain::run::TriggerDescriptor;

    #[test]
    fn test_only_matching_rules_produce_notifications() {
        let mut config = PipelineConfig::default();
        config.notifications.push(NotificationRule {
            events: vec![RunEvent::Failed],
            channel: "#oncall".to_string(),
            recipients: vec!["sre".to_string()],
        });
        config.notifications.push(NotificationRule {
            events: vec![RunEvent::Succeeded, RunEvent::Failed],
            channel: "#deploys".to_string(),
            recipients: vec![],
        });

        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            name: "svc".to_string(),
            description: None,
            repository: "git@example.com:acme/svc.git".to_string(),
            branch: "main".to_string(),
            stages: vec![],
            trigger: TriggerConfig::default(),
            environments: vec![],
            config,
            status: PipelineStatus::Active,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let run = PipelineRun::new(pipeline.id, TriggerDescriptor::manual("dev"));

        let failed = notifications_for(&run, &pipeline, RunEvent::Failed);
        assert_eq!(failed.len(), 2);

        let succeeded = notifications_for(&run, &pipeline, RunEvent::Succeeded);
        assert_eq!(succeeded.len(), 1);
        assert_eq!(succeeded[0].channel, "#deploys");
    }
}
