//! Keyboard construction for menus, search results and admin listings.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};
use unic_langid::LanguageIdentifier;
use url::Url;

use crate::i18n;
use crate::pipeline::responder::JoinPrompt;
use crate::storage::db::User;
use crate::storage::files::StoredFile;
use crate::storage::settings::RequiredChannel;

/// Main reply keyboard shown on /start and after completed flows.
pub fn main_menu(lang: &LanguageIdentifier) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(i18n::t(lang, "menu.search")),
            KeyboardButton::new(i18n::t(lang, "menu.saved")),
        ],
        vec![
            KeyboardButton::new(i18n::t(lang, "menu.help")),
            KeyboardButton::new(i18n::t(lang, "menu.language")),
        ],
    ])
}

/// Inline language picker.
pub fn language_keyboard() -> InlineKeyboardMarkup {
    let rows = i18n::SUPPORTED_LANGS
        .iter()
        .map(|(code, name)| vec![InlineKeyboardButton::callback(name.to_string(), format!("lang:{}", code))])
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

/// Join buttons plus the confirm action, from a rendered prompt.
pub fn join_keyboard(prompt: &JoinPrompt) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    for button in &prompt.channels {
        match Url::parse(&button.url) {
            Ok(url) => rows.push(vec![InlineKeyboardButton::url(button.label.clone(), url)]),
            Err(err) => log::warn!("skipping join button with bad url {}: {}", button.url, err),
        }
    }
    rows.push(vec![InlineKeyboardButton::callback(
        prompt.confirm_label.clone(),
        crate::pipeline::membership::CONFIRM_ACTION,
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// One page of search results: a button per file plus a pagination row.
pub fn search_results_keyboard(
    files: &[StoredFile],
    page: usize,
    total_pages: usize,
    lang: &LanguageIdentifier,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = files
        .iter()
        .map(|file| vec![InlineKeyboardButton::callback(file.title.clone(), format!("search:file:{}", file.id))])
        .collect();

    if total_pages > 1 {
        let mut nav = Vec::new();
        if page > 0 {
            nav.push(InlineKeyboardButton::callback("⬅️", format!("search:page:{}", page - 1)));
        }
        let mut args = fluent_templates::fluent_bundle::FluentArgs::new();
        args.set("current", page + 1);
        args.set("total", total_pages);
        nav.push(InlineKeyboardButton::callback(
            i18n::t_args(lang, "search.page", &args),
            "search:noop",
        ));
        if page + 1 < total_pages {
            nav.push(InlineKeyboardButton::callback("➡️", format!("search:page:{}", page + 1)));
        }
        rows.push(nav);
    }

    InlineKeyboardMarkup::new(rows)
}

/// Download/save actions under a file card.
pub fn file_actions_keyboard(file_id: i64, lang: &LanguageIdentifier) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(i18n::t(lang, "file.download"), format!("files:get:{}", file_id)),
        InlineKeyboardButton::callback(i18n::t(lang, "file.save"), format!("files:save:{}", file_id)),
    ]])
}

/// A saved-list entry row: deliver or remove.
pub fn saved_entry_keyboard(file_id: i64, lang: &LanguageIdentifier) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(i18n::t(lang, "file.download"), format!("files:get:{}", file_id)),
        InlineKeyboardButton::callback(i18n::t(lang, "file.remove"), format!("files:unsave:{}", file_id)),
    ]])
}

/// Removal buttons for the required-channel listing.
pub fn channels_keyboard(channels: &[(RequiredChannel, bool)]) -> InlineKeyboardMarkup {
    let rows = channels
        .iter()
        .map(|(channel, stale)| {
            let marker = if *stale { " ⚠️" } else { "" };
            vec![InlineKeyboardButton::callback(
                format!("🗑 {}{}", channel.label(), marker),
                format!("channels:remove:{}", channel.channel_id),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

/// Block/unblock action under a user card.
pub fn user_actions_keyboard(user: &User, lang: &LanguageIdentifier) -> InlineKeyboardMarkup {
    let button = if user.is_blocked {
        InlineKeyboardButton::callback(
            i18n::t(lang, "admin.unblock_button"),
            format!("users:unblock:{}", user.telegram_id),
        )
    } else {
        InlineKeyboardButton::callback(
            i18n::t(lang, "admin.block_button"),
            format!("users:block:{}", user.telegram_id),
        )
    };
    InlineKeyboardMarkup::new(vec![vec![button]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::files::FileKind;
    use pretty_assertions::assert_eq;

    fn file(id: i64, title: &str) -> StoredFile {
        StoredFile {
            id,
            file_id: "x".to_string(),
            title: title.to_string(),
            kind: FileKind::Document,
            file_name: None,
            tags: None,
            download_count: 0,
        }
    }

    #[test]
    fn search_keyboard_has_row_per_file_and_nav() {
        let lang = i18n::lang_from_code("en");
        let files = vec![file(1, "A"), file(2, "B")];

        let keyboard = search_results_keyboard(&files, 1, 3, &lang);
        // 2 file rows + 1 nav row
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        // Middle page shows both directions plus the page label
        assert_eq!(keyboard.inline_keyboard[2].len(), 3);
    }

    #[test]
    fn search_keyboard_first_page_has_no_back_button() {
        let lang = i18n::lang_from_code("en");
        let keyboard = search_results_keyboard(&[file(1, "A")], 0, 2, &lang);
        let nav = keyboard.inline_keyboard.last().unwrap();
        assert_eq!(nav.len(), 2); // page label + forward only
    }

    #[test]
    fn single_page_search_has_no_nav_row() {
        let lang = i18n::lang_from_code("en");
        let keyboard = search_results_keyboard(&[file(1, "A")], 0, 1, &lang);
        assert_eq!(keyboard.inline_keyboard.len(), 1);
    }

    #[test]
    fn join_keyboard_ends_with_confirm_action() {
        let lang = i18n::lang_from_code("en");
        let channels = vec![RequiredChannel {
            channel_id: -100,
            username: Some("news".to_string()),
            title: None,
            invite_link: None,
        }];
        let prompt = JoinPrompt::for_channels(&lang, "membership.join_required", &channels);

        let keyboard = join_keyboard(&prompt);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
    }
}
