//! Self-contained HTML document
//!
//! Messages are grouped into one section per channel, in order of first
//! appearance. In local mode (bundled export) image and video attachments are
//! shown inline from their bundle paths; otherwise attachments link to their
//! remote URL.

use super::{ExportContext, emoji_label, scope_label};
use crate::markup::{self, escape_html};
use crate::types::{AttachmentDescriptor, MediaKind, NormalizedMessage, Snowflake};
use crate::utils::{human_size, truncate_chars};
use std::fmt::Write;

/// Characters of replied-to content shown in the reply preview
pub const REPLY_PREVIEW_CHARS: usize = 60;

const STYLE: &str = r#"
body { margin: 0; background: #313338; color: #dbdee1; font: 15px/1.4 "gg sans", "Helvetica Neue", Arial, sans-serif; }
header.export { padding: 16px 24px; background: #2b2d31; border-bottom: 1px solid #1e1f22; }
header.export h1 { margin: 0 0 4px; font-size: 20px; color: #f2f3f5; }
header.export .meta { color: #949ba4; font-size: 13px; }
section.channel { padding: 8px 0 24px; }
section.channel > h2 { margin: 16px 24px 8px; font-size: 16px; color: #f2f3f5; border-bottom: 1px solid #3f4147; padding-bottom: 6px; }
.message { padding: 4px 24px; }
.message:hover { background: #2e3035; }
.message .author { font-weight: 600; color: #f2f3f5; }
.message .timestamp, .message .edited { margin-left: 6px; font-size: 12px; color: #949ba4; }
.message .content { white-space: normal; word-wrap: break-word; }
.reply { font-size: 13px; color: #b5bac1; margin-bottom: 2px; }
.reply .reply-author { font-weight: 600; }
blockquote { margin: 2px 0; padding-left: 10px; border-left: 4px solid #4e5058; }
code.inline { background: #2b2d31; padding: 1px 4px; border-radius: 3px; font-family: Consolas, monospace; }
pre.code-block { background: #2b2d31; border: 1px solid #1e1f22; border-radius: 4px; padding: 8px; overflow-x: auto; font-family: Consolas, monospace; }
.spoiler { background: #1e1f22; color: transparent; border-radius: 3px; cursor: pointer; }
.spoiler.revealed { background: #3f4147; color: inherit; }
.mention { background: rgba(88, 101, 242, .3); color: #c9cdfb; border-radius: 3px; padding: 0 2px; }
img.emoji { width: 22px; height: 22px; vertical-align: bottom; }
.attachments { margin-top: 4px; display: flex; flex-wrap: wrap; gap: 6px; }
.attachments img.thumb { max-width: 320px; max-height: 240px; border-radius: 4px; cursor: zoom-in; }
.attachments video { max-width: 400px; max-height: 300px; border-radius: 4px; }
.attachment.file { background: #2b2d31; border: 1px solid #1e1f22; border-radius: 4px; padding: 8px 10px; }
.attachment.file a { color: #00a8fc; }
.attachment .size { color: #949ba4; font-size: 12px; margin-left: 6px; }
.attachment.failed { color: #f23f43; }
.embed { margin-top: 4px; border-left: 4px solid #1e1f22; background: #2b2d31; padding: 6px 10px; border-radius: 4px; max-width: 520px; }
.embed-title { font-weight: 600; color: #00a8fc; }
.reactions { margin-top: 4px; display: flex; gap: 4px; }
.reaction { background: #2b2d31; border-radius: 8px; padding: 1px 6px; font-size: 13px; }
.reaction img.emoji { width: 16px; height: 16px; }
#overlay { display: none; position: fixed; inset: 0; background: rgba(0, 0, 0, .85); align-items: center; justify-content: center; cursor: zoom-out; }
#overlay.open { display: flex; }
#overlay img { max-width: 95vw; max-height: 95vh; }
"#;

const SCRIPT: &str = r#"
function openOverlay(el) {
  document.getElementById('overlay-img').src = el.dataset.full;
  document.getElementById('overlay').classList.add('open');
}
"#;

/// Full HTML document
pub fn render(messages: &[NormalizedMessage], ctx: &ExportContext<'_>) -> String {
    let title = escape_html(&scope_label(ctx.channels));
    let mut out = String::with_capacity(4096 + messages.len() * 512);

    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Export - {title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <header class=\"export\"><h1>{title}</h1><div class=\"meta\">Exported {} &middot; {} messages</div></header>\n",
        ctx.localize(ctx.exported_at),
        messages.len()
    );

    for (channel_id, channel_messages) in group_by_channel(messages) {
        let name = channel_messages
            .first()
            .map(|m| escape_html(&m.channel.name))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "<section class=\"channel\" data-channel-id=\"{channel_id}\">\n<h2>{name}</h2>"
        );
        for message in channel_messages {
            render_message(&mut out, message, ctx);
        }
        out.push_str("</section>\n");
    }

    let _ = write!(
        out,
        "<div id=\"overlay\" onclick=\"this.classList.remove('open')\"><img id=\"overlay-img\" alt=\"\"></div>\n\
         <script>{SCRIPT}</script>\n</body>\n</html>\n"
    );
    out
}

/// Channel groups in order of first appearance, messages in input order
fn group_by_channel(messages: &[NormalizedMessage]) -> Vec<(Snowflake, Vec<&NormalizedMessage>)> {
    let mut groups: Vec<(Snowflake, Vec<&NormalizedMessage>)> = Vec::new();
    for message in messages {
        match groups.iter_mut().find(|(id, _)| *id == message.channel.id) {
            Some((_, group)) => group.push(message),
            None => groups.push((message.channel.id, vec![message])),
        }
    }
    groups
}

fn render_message(out: &mut String, message: &NormalizedMessage, ctx: &ExportContext<'_>) {
    let _ = writeln!(out, "<div class=\"message\" id=\"m{}\">", message.id);

    if let Some(reply) = &message.reply_to {
        let author = reply.author_name.as_deref().unwrap_or("unknown");
        let preview = truncate_chars(&reply.content, REPLY_PREVIEW_CHARS);
        let _ = writeln!(
            out,
            "<div class=\"reply\">&#8618; <a href=\"#m{}\"><span class=\"reply-author\">{}</span></a> <span class=\"reply-content\">{}</span></div>",
            reply.message_id,
            escape_html(author),
            escape_html(&preview)
        );
    }

    let edited = match message.edited_timestamp {
        Some(t) => format!(
            "<span class=\"edited\" title=\"{}\">(edited)</span>",
            ctx.localize(t)
        ),
        None => String::new(),
    };
    let _ = writeln!(
        out,
        "<div class=\"header\"><span class=\"author\" title=\"{}\">{}</span><span class=\"timestamp\">{}</span>{}</div>",
        escape_html(&message.author.tag()),
        escape_html(message.author.label()),
        ctx.localize(message.timestamp),
        edited
    );

    if !message.content.is_empty() {
        let _ = writeln!(
            out,
            "<div class=\"content\">{}</div>",
            markup::render(&message.content)
        );
    }

    for embed in &message.embeds {
        render_embed(out, embed);
    }

    if !message.attachments.is_empty() {
        out.push_str("<div class=\"attachments\">\n");
        for attachment in &message.attachments {
            render_attachment(out, attachment, ctx);
        }
        out.push_str("</div>\n");
    }

    if !message.reactions.is_empty() {
        out.push_str("<div class=\"reactions\">");
        for reaction in &message.reactions {
            let emoji = match reaction.emoji.id {
                Some(id) => {
                    let ext = if reaction.emoji.animated { "gif" } else { "png" };
                    format!(
                        "<img class=\"emoji\" src=\"{}/{}.{}\" alt=\"{}\">",
                        markup::EMOJI_CDN,
                        id,
                        ext,
                        escape_html(&emoji_label(&reaction.emoji))
                    )
                }
                None => escape_html(&reaction.emoji.name),
            };
            let _ = write!(
                out,
                "<span class=\"reaction\">{} {}</span>",
                emoji, reaction.count
            );
        }
        out.push_str("</div>\n");
    }

    out.push_str("</div>\n");
}

fn render_embed(out: &mut String, embed: &serde_json::Value) {
    let title = embed.get("title").and_then(|v| v.as_str());
    let description = embed.get("description").and_then(|v| v.as_str());
    let url = embed
        .get("url")
        .and_then(|v| v.as_str())
        .filter(|u| u.starts_with("https://") || u.starts_with("http://"));
    if title.is_none() && description.is_none() {
        return;
    }

    out.push_str("<div class=\"embed\">");
    match (title, url) {
        (Some(title), Some(url)) => {
            let _ = write!(
                out,
                "<div class=\"embed-title\"><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a></div>",
                escape_html(url),
                escape_html(title)
            );
        }
        (Some(title), None) => {
            let _ = write!(out, "<div class=\"embed-title\">{}</div>", escape_html(title));
        }
        _ => {}
    }
    if let Some(description) = description {
        let _ = write!(
            out,
            "<div class=\"embed-description\">{}</div>",
            markup::render(description)
        );
    }
    out.push_str("</div>\n");
}

fn render_attachment(out: &mut String, attachment: &AttachmentDescriptor, ctx: &ExportContext<'_>) {
    let name = escape_html(&attachment.filename);
    let size = human_size(attachment.size);

    let Some(paths) = ctx.local_paths else {
        let _ = writeln!(
            out,
            "<div class=\"attachment file\"><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a><span class=\"size\">{}</span></div>",
            escape_html(&attachment.url),
            name,
            size
        );
        return;
    };

    let Some(path) = paths.get(&attachment.id) else {
        let _ = writeln!(
            out,
            "<div class=\"attachment failed\">{} <span class=\"size\">(not downloaded)</span></div>",
            name
        );
        return;
    };
    let path = escape_html(&bundle_href(path));

    let _ = match attachment.media_kind() {
        MediaKind::Image => writeln!(
            out,
            "<div class=\"attachment image\"><img class=\"thumb\" src=\"{path}\" data-full=\"{path}\" alt=\"{name}\" loading=\"lazy\" onclick=\"openOverlay(this)\"></div>"
        ),
        MediaKind::Video => writeln!(
            out,
            "<div class=\"attachment video\"><video controls preload=\"metadata\" src=\"{path}\" title=\"{name}\"></video></div>"
        ),
        MediaKind::Other => writeln!(
            out,
            "<div class=\"attachment file\"><a href=\"{path}\" download>{name}</a><span class=\"size\">{size}</span></div>"
        ),
    };
}

/// Relative link to a bundled file, each path segment percent-encoded
fn bundle_href(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
