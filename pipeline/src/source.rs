use crate::config::SourceConfig;
use crate::errors::PipelineError;
use crate::transport::QueueGroup;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Publishes every non-blank line of `reader` as one message on `subject`.
/// Returns the number of messages published.
pub async fn publish_lines<R>(
    reader: R,
    subject: &str,
    group: &QueueGroup,
) -> Result<usize, PipelineError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        group.publish(subject, line.as_bytes().to_vec()).await?;
        published += 1;
    }

    Ok(published)
}

/// Feeds the queue group from the configured source until it is exhausted.
pub async fn run_source(config: &SourceConfig, group: QueueGroup) -> Result<usize, PipelineError> {
    let published = match config {
        SourceConfig::Stdin { subject } => {
            tracing::info!(subject = %subject, "reading events from stdin");
            publish_lines(BufReader::new(tokio::io::stdin()), subject, &group).await?
        }
        SourceConfig::File { path, subject } => {
            tracing::info!(path = %path.display(), subject = %subject, "reading events from file");
            let file = tokio::fs::File::open(path).await?;
            publish_lines(BufReader::new(file), subject, &group).await?
        }
    };

    tracing::info!(published, "source exhausted");
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Messaging;
    use crate::errors::PublishError;
    use crate::transport::Message;

    fn group() -> QueueGroup {
        QueueGroup::new(&Messaging {
            queue_group: "source-test".into(),
            channels: vec!["system-events".into()],
            buffer_size: 16,
            concurrency: 1,
            max_deliver: 1,
        })
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let group = group();
        let input = b"{\"a\":1}\n\n   \n{\"b\":2}\r\n" as &[u8];

        let published = publish_lines(input, "system-events", &group).await.unwrap();
        assert_eq!(published, 2);

        let first = group.next().await.unwrap();
        assert_eq!(first.payload(), b"{\"a\":1}");
        first.ack().await.unwrap();
        let second = group.next().await.unwrap();
        assert_eq!(second.payload(), b"{\"b\":2}");
        second.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribed_subject_fails() {
        let err = publish_lines(b"{}\n" as &[u8], "elsewhere", &group())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Publish(PublishError::NoSubscriber(_))
        ));
    }

    #[tokio::test]
    async fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        std::fs::write(&path, "{\"id\":\"1\"}\n{\"id\":\"2\"}\n").unwrap();

        let group = group();
        let config = SourceConfig::File {
            path,
            subject: "system-events/apps".into(),
        };
        assert_eq!(run_source(&config, group.clone()).await.unwrap(), 2);
        assert_eq!(group.pending(), 2);
        assert_eq!(group.next().await.unwrap().subject(), "system-events/apps");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let config = SourceConfig::File {
            path: "/nonexistent/events.ndjson".into(),
            subject: "system-events".into(),
        };
        let err = run_source(&config, group()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
