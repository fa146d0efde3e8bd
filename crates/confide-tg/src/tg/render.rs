//! Pure builders for every message text and inline keyboard the bot sends.
//!
//! Texts are HTML with user-controlled parts escaped, keyboards carry
//! [`CallbackData`] payloads. Keeping these free of I/O makes them
//! snapshot-testable.

use super::callback::CallbackData;
use crate::db::{
    Comment, CommentPage, Confession, Feedback, FeedbackStatus, ReactionCounts, ReactionKind, User,
    UserStats,
};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::html;

fn button(text: &str, data: CallbackData) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, data.encode())
}

pub(crate) fn welcome() -> String {
    "Welcome to the confession bot!\n\n\
    Share what's on your mind with /confess. Your confession goes to the \
    moderators first and is published to the channel once approved, \
    anonymously unless you opt out in /settings.\n\n\
    See /help for the full list of commands."
        .to_owned()
}

pub(crate) fn confession_prompt() -> String {
    "Send me your confession as a single message. Use /cancel to back out.".to_owned()
}

pub(crate) fn confession_preview(text: &str, is_anonymous: bool) -> String {
    let visibility = if is_anonymous {
        "anonymously"
    } else {
        "with your name attached"
    };
    format!(
        "Here is how your confession will look once approved \
        (published {visibility}):\n\n{}",
        html::escape(text)
    )
}

pub(crate) fn confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        button("✅ Submit", CallbackData::ConfirmConfession),
        button("🗑 Discard", CallbackData::DiscardConfession),
    ]])
}

/// The post published to the channel.
pub(crate) fn channel_post(confession: &Confession, author: Option<&User>) -> String {
    let signature = match author {
        Some(author) => format!("\n\n— {}", html::escape(&author.full_name)),
        None => String::new(),
    };
    format!(
        "Confession #{}\n\n{}{signature}",
        confession.id,
        html::escape(&confession.text)
    )
}

pub(crate) fn channel_keyboard(confession_id: i64, comment_count: i64) -> InlineKeyboardMarkup {
    let label = if comment_count == 0 {
        "💬 Comments".to_owned()
    } else {
        format!("💬 Comments ({comment_count})")
    };
    InlineKeyboardMarkup::new([[button(
        &label,
        CallbackData::ViewComments { confession_id },
    )]])
}

/// A pending confession as shown to admins by `/pending`. The author is
/// always visible to moderators, anonymity only applies to the channel.
pub(crate) fn review_card(confession: &Confession, author: &User) -> String {
    let visibility = if confession.is_anonymous {
        "anonymous"
    } else {
        "public"
    };
    format!(
        "Confession #{} ({visibility}) from {}:\n\n{}",
        confession.id,
        html::escape(&author.full_name),
        html::escape(&confession.text)
    )
}

pub(crate) fn review_keyboard(confession_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        button("✅ Approve", CallbackData::Approve { confession_id }),
        button("❌ Reject", CallbackData::Reject { confession_id }),
    ]])
}

pub(crate) fn comments_header(confession: &Confession, page: &CommentPage) -> String {
    if page.items.is_empty() {
        return format!(
            "Confession #{} has no comments yet. Be the first!",
            confession.id
        );
    }
    format!(
        "Comments on confession #{} (page {}/{}):",
        confession.id, page.current_page, page.total_pages
    )
}

/// Navigation and "add comment" controls shown under the page header.
pub(crate) fn comments_nav_keyboard(
    confession_id: i64,
    page: &CommentPage,
) -> InlineKeyboardMarkup {
    let mut nav = Vec::new();
    if page.has_previous {
        nav.push(button(
            "⬅️ Newer",
            CallbackData::CommentsPage {
                confession_id,
                page: page.current_page - 1,
            },
        ));
    }
    if page.has_next {
        nav.push(button(
            "Older ➡️",
            CallbackData::CommentsPage {
                confession_id,
                page: page.current_page + 1,
            },
        ));
    }

    let mut rows = Vec::new();
    if !nav.is_empty() {
        rows.push(nav);
    }
    rows.push(vec![button(
        "✍️ Add comment",
        CallbackData::AddComment { confession_id },
    )]);

    InlineKeyboardMarkup::new(rows)
}

/// A single comment card. Replies are indented under their parent.
pub(crate) fn comment_card(comment: &Comment, replies: &[Comment]) -> String {
    let mut card = html::escape(&comment.text);
    for reply in replies {
        card.push_str("\n  ↳ ");
        card.push_str(&html::escape(&reply.text));
    }
    card
}

pub(crate) fn comment_keyboard(comment_id: i64, counts: &ReactionCounts) -> InlineKeyboardMarkup {
    let react = |kind| CallbackData::React { comment_id, kind };
    InlineKeyboardMarkup::new([vec![
        button(&format!("👍 {}", counts.like_count), react(ReactionKind::Like)),
        button(
            &format!("👎 {}", counts.dislike_count),
            react(ReactionKind::Dislike),
        ),
        button("🚩", react(ReactionKind::Report)),
        button("↩️ Reply", CallbackData::ReplyTo { comment_id }),
    ]])
}

pub(crate) fn comment_prompt(replying: bool) -> String {
    let target = if replying { "reply" } else { "comment" };
    format!("Send me your {target} as a single message. Use /cancel to back out.")
}

pub(crate) fn settings(user: &User) -> String {
    let mode = if user.is_anonymous_mode {
        "anonymously"
    } else {
        "with your name attached"
    };
    format!("Your confessions are currently published {mode}.")
}

pub(crate) fn settings_keyboard(user: &User) -> InlineKeyboardMarkup {
    let label = if user.is_anonymous_mode {
        "Publish with my name"
    } else {
        "Publish anonymously"
    };
    InlineKeyboardMarkup::new([[button(label, CallbackData::ToggleAnonymity)]])
}

pub(crate) fn stats(stats: &UserStats) -> String {
    format!(
        "Your numbers so far:\n\n\
        Approved confessions: {}\n\
        Comments written: {}\n\
        Impact points: {}\n\
        Acceptance score: {:.0}%",
        stats.approved_confessions,
        stats.total_comments,
        stats.impact_points,
        stats.acceptance_score,
    )
}

pub(crate) fn feedback_prompt() -> String {
    "Tell me what you think about the bot, in a single message. \
    Use /cancel to back out."
        .to_owned()
}

pub(crate) fn feedback_card(feedback: &Feedback, author: &User) -> String {
    let mut card = format!(
        "Feedback #{} ({}) from {}:\n\n{}",
        feedback.id,
        feedback.status,
        html::escape(&author.full_name),
        html::escape(&feedback.text)
    );
    if !feedback.admin_notes.is_empty() {
        card.push_str("\n\nNotes:\n");
        card.push_str(&html::escape(&feedback.admin_notes));
    }
    card
}

pub(crate) fn feedback_keyboard(feedback_id: i64) -> InlineKeyboardMarkup {
    let set = |status| CallbackData::SetFeedbackStatus {
        feedback_id,
        status,
    };
    InlineKeyboardMarkup::new([[
        button("👀 Reviewed", set(FeedbackStatus::Reviewed)),
        button("✅ Resolved", set(FeedbackStatus::Resolved)),
    ]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use expect_test::expect;

    fn user(full_name: &str) -> User {
        User {
            id: 1,
            tg_id: 1,
            full_name: full_name.to_owned(),
            username: None,
            is_anonymous_mode: true,
            is_admin: false,
            total_confessions: 0,
            total_comments: 0,
            impact_points: 0,
            created_at: Utc::now(),
        }
    }

    fn confession(text: &str, is_anonymous: bool) -> Confession {
        Confession {
            id: 42,
            user_id: 1,
            text: text.to_owned(),
            is_anonymous,
            status: crate::db::ConfessionStatus::Pending,
            channel_message_id: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn channel_post_hides_the_author_when_anonymous() {
        let confession = confession("I <3 Rust", true);

        let anonymous = channel_post(&confession, None);
        expect![[r#"
            Confession #42

            I &lt;3 Rust"#]]
        .assert_eq(&anonymous);

        let signed = channel_post(&confession, Some(&user("Ana <X>")));
        expect![[r#"
            Confession #42

            I &lt;3 Rust

            — Ana &lt;X&gt;"#]]
        .assert_eq(&signed);
    }

    #[test]
    fn review_card_always_names_the_author() {
        let card = review_card(&confession("secret", true), &user("Ana"));
        expect![[r#"
            Confession #42 (anonymous) from Ana:

            secret"#]]
        .assert_eq(&card);
    }

    #[test]
    fn comment_card_indents_replies() {
        let comment = Comment {
            id: 1,
            confession_id: 42,
            user_id: 1,
            parent_comment_id: None,
            text: "top".to_owned(),
            like_count: 0,
            dislike_count: 0,
            report_count: 0,
            created_at: Utc::now(),
        };
        let reply = Comment {
            id: 2,
            parent_comment_id: Some(1),
            text: "first reply".to_owned(),
            ..comment.clone()
        };

        let card = comment_card(&comment, &[reply]);
        expect![[r#"
            top
              ↳ first reply"#]]
        .assert_eq(&card);
    }
}
