// Copyright 2025 R4U Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! SSE transcript parsing shared by the streaming reconstruction paths.

#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Split a raw SSE transcript into events. Blank lines terminate an event;
/// `event:` sets the event type, `data:` lines accumulate (joined by `\n`);
/// a literal `data: [DONE]` line ends the stream without yielding an event.
/// Malformed JSON inside `data` is not this function's concern — callers
/// skip unparsable chunks individually so one bad chunk doesn't abort the
/// whole reconstruction.
pub fn parse_sse_stream(transcript: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    let mut current_event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    let flush = |event: &mut Option<String>, data_lines: &mut Vec<&str>, out: &mut Vec<SseEvent>| {
        if !data_lines.is_empty() {
            out.push(SseEvent {
                event: event.take(),
                data: data_lines.join("\n"),
            });
        }
        data_lines.clear();
    };

    for line in transcript.lines() {
        if line.is_empty() {
            flush(&mut current_event, &mut data_lines, &mut events);
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            current_event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            let value = rest.trim();
            if value == "[DONE]" {
                flush(&mut current_event, &mut data_lines, &mut events);
                break;
            }
            data_lines.push(value);
        }
        // Other SSE fields (id:, retry:, comments) are not meaningful here.
    }
    flush(&mut current_event, &mut data_lines, &mut events);
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_chat_completions_stream() {
        let transcript = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                           data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
                           data: [DONE]\n";
        let events = parse_sse_stream(transcript);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn event_field_is_captured_for_responses_api() {
        let transcript =
            "event: response.completed\ndata: {\"response\":{\"id\":\"r1\"}}\n\n";
        let events = parse_sse_stream(transcript);
        assert_eq!(events[0].event.as_deref(), Some("response.completed"));
    }

    #[test]
    fn empty_transcript_yields_no_events() {
        assert!(parse_sse_stream("").is_empty());
    }
}
