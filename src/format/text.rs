//! Plain text transcript

use super::{ExportContext, reactions_line, reply_author, scope_label};
use crate::types::{NormalizedMessage, Snowflake};
use std::fmt::Write;

const RULE: &str = "================================================";

/// Transcript with a banner whenever the channel changes
pub fn render(messages: &[NormalizedMessage], ctx: &ExportContext<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Export of {}", scope_label(ctx.channels));
    let _ = writeln!(out, "Exported at {}", ctx.localize(ctx.exported_at));
    let _ = writeln!(out, "Messages: {}", messages.len());
    let _ = writeln!(out, "{RULE}");

    let mut current: Option<Snowflake> = None;
    for message in messages {
        if current != Some(message.channel.id) {
            current = Some(message.channel.id);
            let _ = writeln!(out);
            let _ = writeln!(out, "--- {} ---", message.channel.name);
        }

        let edited = if message.edited_timestamp.is_some() {
            " (edited)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "[{}] {}: {}{}",
            ctx.localize(message.timestamp),
            message.author.label(),
            message.content,
            edited
        );

        for attachment in &message.attachments {
            let _ = writeln!(out, "    Attachment: {} ({})", attachment.filename, attachment.url);
        }
        if !message.reactions.is_empty() {
            let _ = writeln!(out, "    Reactions: {}", reactions_line(&message.reactions));
        }
        if let (Some(reply), Some(author)) = (&message.reply_to, reply_author(message)) {
            let _ = writeln!(out, "    Reply to {}: {}", author, reply.content);
        }
    }
    out
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::fixtures::*;
    use crate::types::{ExportRequest, ReplyReference};
    use chrono::FixedOffset;

    #[test]
    fn banner_is_emitted_on_every_channel_change() {
        let request = ExportRequest::channels(vec![Snowflake(1), Snowflake(2)]);
        let general = channel(1, "#general");
        let random = channel(2, "#random");
        let channels = [general.clone(), random.clone()];
        let ctx = ExportContext::new(&request, &channels)
            .with_offset(FixedOffset::east_opt(0).unwrap());
        let ana = author(3, "ana");

        let messages = vec![
            message(10, &general, &ana, 0, "first"),
            message(11, &random, &ana, 1, "second"),
            message(12, &general, &ana, 2, "third"),
        ];
        let out = render(&messages, &ctx);

        assert!(out.starts_with("Export of 2 channels\n"));
        assert_eq!(out.matches("--- #general ---").count(), 2);
        assert_eq!(out.matches("--- #random ---").count(), 1);
        assert!(out.contains("[2024-03-01 12:00:00] ana: first\n"));
        let first = out.find("first").unwrap();
        let second = out.find("second").unwrap();
        let third = out.find("third").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn annotations_follow_the_message_line() {
        let request = ExportRequest::channel(Snowflake(1));
        let general = channel(1, "#general");
        let channels = [general.clone()];
        let ctx = ExportContext::new(&request, &channels)
            .with_offset(FixedOffset::east_opt(0).unwrap());

        let mut msg = message(10, &general, &author(3, "ana"), 0, "look");
        msg.attachments.push(attachment(4, "cat.png", Some("image/png")));
        msg.reactions.push(reaction("😀", 2));
        msg.reply_to = Some(ReplyReference {
            message_id: Snowflake(9),
            author_id: None,
            author_name: None,
            content: "what?".into(),
        });

        let out = render(&[msg], &ctx);
        let body: Vec<&str> = out.lines().skip_while(|l| !l.starts_with('[')).collect();
        assert_eq!(
            body,
            vec![
                "[2024-03-01 12:00:00] ana: look",
                "    Attachment: cat.png (https://cdn.discordapp.com/attachments/1/4/cat.png)",
                "    Reactions: 😀 2",
                "    Reply to unknown: what?",
            ]
        );
    }
}
