//! Tabular CSV export
//!
//! Every field is quoted, embedded quotes are doubled and line breaks are
//! flattened to spaces, so each message is exactly one line.

use super::{ExportContext, reactions_line, reply_author};
use crate::types::NormalizedMessage;

/// Header row
pub const HEADER: [&str; 7] = [
    "Timestamp",
    "Channel",
    "Author",
    "Content",
    "Attachments",
    "Reactions",
    "Reply To",
];

/// Quote one field
pub fn quote_field(value: &str) -> String {
    let flattened = value.replace("\r\n", " ").replace(['\n', '\r'], " ");
    format!("\"{}\"", flattened.replace('"', "\"\""))
}

fn row<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|f| quote_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Header plus one row per message
pub fn render(messages: &[NormalizedMessage], ctx: &ExportContext<'_>) -> String {
    let mut out = row(HEADER);
    out.push('\n');

    for message in messages {
        let attachments = message
            .attachments
            .iter()
            .map(|a| a.url.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let reply = match (&message.reply_to, reply_author(message)) {
            (Some(reply), Some(author)) => format!("{}: {}", author, reply.content),
            _ => String::new(),
        };

        out.push_str(&row([
            ctx.localize(message.timestamp),
            message.channel.name.clone(),
            message.author.tag(),
            message.content.clone(),
            attachments,
            reactions_line(&message.reactions),
            reply,
        ]));
        out.push('\n');
    }
    out
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::fixtures::*;
    use crate::types::{ExportRequest, ReplyReference, Snowflake};
    use chrono::FixedOffset;

    /// Minimal RFC 4180 reader for fully quoted records
    fn parse_line(line: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut chars = line.chars().peekable();
        let mut quoted = false;
        while let Some(c) = chars.next() {
            match (c, quoted) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                ('"', _) => quoted = !quoted,
                (',', false) => fields.push(std::mem::take(&mut current)),
                (c, _) => current.push(c),
            }
        }
        fields.push(current);
        fields
    }

    #[test]
    fn tricky_content_survives_a_round_trip() {
        let request = ExportRequest::channel(Snowflake(1));
        let general = channel(1, "#general");
        let channels = [general.clone()];
        let ctx = ExportContext::new(&request, &channels)
            .with_offset(FixedOffset::east_opt(0).unwrap());
        let mut msg = message(7, &general, &author(2, "ana"), 5, "one, \"two\"\nthree");
        msg.attachments.push(attachment(3, "a.png", None));
        msg.reactions.push(reaction("🔥", 4));
        msg.reply_to = Some(ReplyReference {
            message_id: Snowflake(6),
            author_id: Some(Snowflake(4)),
            author_name: Some("bo".into()),
            content: "earlier".into(),
        });

        let out = render(&[msg], &ctx);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2, "one header and one row");

        assert_eq!(parse_line(lines[0]), HEADER.to_vec());
        let fields = parse_line(lines[1]);
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[0], "2024-03-01 12:05:00");
        assert_eq!(fields[1], "#general");
        assert_eq!(fields[2], "ana");
        assert_eq!(fields[3], "one, \"two\" three");
        assert_eq!(
            fields[4],
            "https://cdn.discordapp.com/attachments/1/3/a.png"
        );
        assert_eq!(fields[5], "🔥 4");
        assert_eq!(fields[6], "bo: earlier");
    }

    #[test]
    fn quotes_next_to_field_separators_round_trip() {
        let row = [quote_field("a,\"b\""), quote_field("\",\""), quote_field("tail")].join(",");
        assert_eq!(row, "\"a,\"\"b\"\"\",\"\"\",\"\"\",\"tail\"");
        assert_eq!(parse_line(&row), vec!["a,\"b\"", "\",\"", "tail"]);

        let request = ExportRequest::channel(Snowflake(1));
        let general = channel(1, "#general");
        let channels = [general.clone()];
        let ctx = ExportContext::new(&request, &channels);
        let msg = message(8, &general, &author(2, "ana"), 0, "a,\"b\"");
        let out = render(&[msg], &ctx);
        let fields = parse_line(out.lines().nth(1).unwrap());
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[3], "a,\"b\"");
    }

    #[test]
    fn every_field_is_quoted() {
        assert_eq!(quote_field(""), "\"\"");
        assert_eq!(quote_field("a\r\nb"), "\"a b\"");
        assert_eq!(quote_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
