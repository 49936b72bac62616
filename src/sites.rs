use std::path::PathBuf;

use crate::config::Paths;
use crate::selector::Locator;

/// Static description of one target site: where to go, what proves the
/// page is loaded and authenticated, what proves it wants credentials, and
/// which persistent profile keeps the login alive across runs.
#[derive(Debug, Clone)]
pub struct Site {
    pub name: &'static str,
    pub url: &'static str,
    pub ready_markers: Vec<Locator>,
    pub login_markers: Vec<Locator>,
    pub profile_dir: PathBuf,
}

impl Site {
    /// WhatsApp Web. Ready once the chat-list side pane exists; a QR code
    /// means the session needs pairing.
    pub fn messaging(paths: &Paths) -> Self {
        Self {
            name: "WhatsApp Web",
            url: "https://web.whatsapp.com/",
            ready_markers: vec![Locator::css("#side")],
            login_markers: vec![
                Locator::css("[data-testid=\"qr-code\"]"),
                Locator::css("canvas[aria-label]"),
            ],
            profile_dir: paths.messaging_profile.clone(),
        }
    }

    /// Whatsmenu back-office. The entry URL carries the dashboard callback
    /// so a logged-in profile lands straight on the request list.
    pub fn orders(paths: &Paths) -> Self {
        Self {
            name: "Whatsmenu",
            url: "https://next.whatsmenu.com.br/auth/login?callbackUrl=https%3A%2F%2Fnext.whatsmenu.com.br%2Fdashboard%2Frequest",
            ready_markers: vec![Locator::css("#main > section > div")],
            login_markers: vec![Locator::css("form[class]")],
            profile_dir: paths.orders_profile.clone(),
        }
    }
}

/// Orders-dashboard content.
pub mod orders {
    use super::Locator;

    /// One element per order card in the request list; row text carries the
    /// customer phone in parentheses.
    pub fn order_rows() -> Locator {
        Locator::css("#main > section > div")
    }
}

/// Messaging-site controls and marker phrases. The chains are ordered:
/// accessible-name selectors first, data-testid and positional fallbacks
/// after, so a partial site change degrades instead of breaking.
pub mod messaging {
    use super::Locator;

    /// Day separators group bubbles; everything after this marker is today.
    pub const TODAY_MARKER: &str = "HOJE";

    /// Phrase a confirmation message always carries.
    pub const ORDER_CODE_MARKER: &str = "Código do pedido";

    /// Platform link present in confirmations sent through the dashboard.
    pub const PLATFORM_DOMAIN: &str = "www.whatsmenu.com.br";

    pub fn new_chat_candidates() -> Vec<Locator> {
        vec![
            Locator::css("[aria-label=\"Nova conversa\"]"),
            Locator::css("[aria-label=\"New chat\"]"),
            Locator::css("[data-testid=\"new-chat-button\"]"),
            Locator::css("div[title=\"Nova conversa\"]"),
            Locator::css("div[title=\"New chat\"]"),
        ]
    }

    pub fn search_box_candidates() -> Vec<Locator> {
        vec![
            Locator::css("[aria-label=\"Pesquisar nome ou número\"]"),
            Locator::css("[aria-label=\"Search input textbox\"]"),
        ]
    }

    /// Chat row matched by exact display-name equality.
    pub fn chat_row(formatted: &str) -> Locator {
        Locator::xpath(format!("//span[@title=\"{formatted}\"]"))
    }

    /// Legacy positional locator for the first search result row; used only
    /// when the click on the titled row is intercepted by an overlay.
    pub fn chat_row_fallback() -> Locator {
        Locator::xpath(
            "//*[@id=\"app\"]/div/div[3]/div/div[2]/div[1]/span/div/span/div/div[2]/div[3]/div[2]/div[1]/div/span",
        )
    }

    pub fn back_button() -> Locator {
        Locator::css("div[aria-label=\"Voltar\"]")
    }

    pub fn message_box_candidates() -> Vec<Locator> {
        vec![
            Locator::css("div[contenteditable=\"true\"][data-tab=\"10\"]"),
            Locator::css("div[role=\"textbox\"]"),
            Locator::css("[contenteditable=\"true\"]"),
        ]
    }

    /// Every message bubble in the open conversation.
    pub fn message_bubbles() -> Locator {
        Locator::css(".copyable-area")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_are_per_site() {
        let paths = Paths::new("/tmp/data");
        let messaging = Site::messaging(&paths);
        let orders = Site::orders(&paths);
        assert_ne!(messaging.profile_dir, orders.profile_dir);
    }

    #[test]
    fn test_chat_row_embeds_display_name() {
        let row = messaging::chat_row("+55 85 98164-7142");
        assert_eq!(
            row.expression,
            "//span[@title=\"+55 85 98164-7142\"]"
        );
    }

    #[test]
    fn test_fallback_chains_lead_with_semantic_selectors() {
        let chain = messaging::new_chat_candidates();
        assert!(chain[0].expression.contains("aria-label"));
        assert!(chain.len() >= 3);
    }
}
