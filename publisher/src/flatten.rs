use pipeline::formatter;
use pipeline::model::{RawEvent, ScrubbedEvent};
use pipeline::scrubber::scrub;
use pipeline::validator::is_valid;

/// Flattens newline-delimited CloudEvents. Lines that do not parse, do not
/// validate or cannot be scrubbed are logged and left out.
pub fn flatten_ndjson(input: &str) -> String {
    let events: Vec<ScrubbedEvent> = input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| {
            let line_number = index + 1;
            let event = match RawEvent::from_slice(line.as_bytes()) {
                Ok(event) => event,
                Err(e) => {
                    tracing::info!(line = line_number, error = %e, "failed to unmarshal event");
                    return None;
                }
            };
            if !is_valid(&event) {
                tracing::info!(line = line_number, id = %event.id, "event is not valid");
                return None;
            }
            match scrub(event) {
                Ok(scrubbed) => Some(scrubbed),
                Err(e) => {
                    tracing::info!(line = line_number, error = %e, "failed to scrub event");
                    None
                }
            }
        })
        .collect();

    formatter::write(&events)
}
