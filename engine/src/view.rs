//! Rendered proposal views.
//!
//! The engine never formats for a particular front-end. It builds a
//! [`RenderedView`] (an embed-like card: title, description, fields, footer,
//! controls) and hands it to a [`crate::MessageChannel`]. Proposal fields come
//! from a [`ProposalRenderer`] so embedders can restyle item listings.

use fusion_types::{Item, Participant};

/// Maximum characters in one proposal field.
pub const MAX_FIELD_LEN: usize = 1024;

/// Maximum characters in a whole view before falling back to compact mode.
pub const MAX_VIEW_LEN: usize = 6000;

const EMPTY_PROPOSAL: &str = "*Empty*";
const BLANK: &str = "\u{200B}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Pending,
    Success,
    Danger,
    Expired,
}

/// Prefix state shown next to the participant's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalMarker {
    None,
    Locked,
    Accepted,
    Cancelled,
}

impl ProposalMarker {
    #[must_use]
    pub fn emote(self) -> &'static str {
        match self {
            ProposalMarker::None => "",
            ProposalMarker::Locked => "\u{1F512}",
            ProposalMarker::Accepted => "\u{2705}",
            ProposalMarker::Cancelled => "\u{1F6AB}",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Lock / reset / cancel buttons while the proposal is edited.
    Selection,
    /// Accept / deny buttons once the proposal is locked.
    Confirmation,
}

impl SurfaceKind {
    #[must_use]
    pub fn actions(self) -> &'static [&'static str] {
        match self {
            SurfaceKind::Selection => &["Lock proposal", "Reset", "Cancel fusion"],
            SurfaceKind::Confirmation => &["Accept", "Deny"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub surface: SurfaceKind,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl ViewField {
    /// Spacer inserted to keep continuation pages aligned.
    #[must_use]
    pub fn is_padding(&self) -> bool {
        self.name == BLANK && self.value == BLANK
    }

    fn len(&self) -> usize {
        self.name.chars().count() + self.value.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedView {
    /// Plain message line above the card.
    pub content: Option<String>,
    pub title: String,
    pub description: String,
    pub tone: Tone,
    pub fields: Vec<ViewField>,
    pub footer: Option<String>,
    pub controls: Controls,
}

impl RenderedView {
    /// Character count of the card, measured the way chat embeds are limited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.title.chars().count()
            + self.description.chars().count()
            + self.fields.iter().map(ViewField::len).sum::<usize>()
            + self.footer.as_ref().map_or(0, |f| f.chars().count())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All field values joined, for plain-text front-ends and assertions.
    #[must_use]
    pub fn proposal_text(&self) -> String {
        self.fields
            .iter()
            .filter(|f| f.value != BLANK)
            .map(|f| f.value.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Read-only view of a proposal handed to renderers.
#[derive(Debug, Clone, Copy)]
pub struct ProposalSnapshot<'a> {
    pub participant: &'a Participant,
    pub marker: ProposalMarker,
    /// The proposal passed validation at some point, even if the session
    /// was cancelled afterwards.
    pub locked: bool,
    pub items: &'a [Item],
}

/// Materializes a proposal as view fields.
///
/// Called on every refresh; it must be a pure function of the snapshot. When
/// `compact` is set the output should be noticeably shorter; it is requested
/// after a full rendering exceeded [`MAX_VIEW_LEN`].
pub trait ProposalRenderer: Send + Sync {
    fn proposal_fields(&self, snapshot: &ProposalSnapshot<'_>, compact: bool) -> Vec<ViewField>;
}

/// Markdown-flavoured listing: one line per item, paged into fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRenderer;

impl TextRenderer {
    /// Build pages below [`MAX_FIELD_LEN`] without cutting a line in half.
    fn pages(snapshot: &ProposalSnapshot<'_>, compact: bool) -> Vec<String> {
        let mut pages = vec![String::new()];
        for item in snapshot.items {
            let description = item.description(compact);
            let mut line = if snapshot.locked {
                format!("- *{description}*\n")
            } else {
                format!("- {description}\n")
            };
            if snapshot.marker == ProposalMarker::Cancelled {
                line = format!("~~{line}~~");
            }

            let current = pages.last().map_or(0, |p| p.chars().count());
            if current + line.chars().count() > MAX_FIELD_LEN {
                pages.push(String::new());
            }
            if let Some(page) = pages.last_mut() {
                page.push_str(&line);
            }
        }
        if pages[0].is_empty() {
            pages[0] = EMPTY_PROPOSAL.to_string();
        }
        pages
    }
}

impl ProposalRenderer for TextRenderer {
    fn proposal_fields(&self, snapshot: &ProposalSnapshot<'_>, compact: bool) -> Vec<ViewField> {
        let mut pages = Self::pages(snapshot, compact).into_iter();
        let mut fields = Vec::new();
        let heading = format!(
            "{} {}",
            snapshot.marker.emote(),
            snapshot.participant.name
        )
        .trim_start()
        .to_string();
        if let Some(first) = pages.next() {
            fields.push(ViewField {
                name: heading,
                value: first,
                inline: true,
            });
        }
        // Continuation pages stack vertically: pad each row so the next page
        // lands under the first one.
        for page in pages {
            fields.push(ViewField {
                name: BLANK.to_string(),
                value: BLANK.to_string(),
                inline: true,
            });
            fields.push(ViewField {
                name: BLANK.to_string(),
                value: page,
                inline: true,
            });
            fields.push(ViewField {
                name: BLANK.to_string(),
                value: BLANK.to_string(),
                inline: true,
            });
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use fusion_types::{ItemId, Kind, KindId, PlayerId};

    use super::*;

    fn items(count: i64, name: &str) -> Vec<Item> {
        (1..=count)
            .map(|id| Item {
                id: ItemId::new(id),
                kind: Kind::new(KindId::new(1), name, true),
                owner: PlayerId::new(1),
                tier: None,
                favorite: false,
                shiny: false,
                attack_bonus: 1,
                health_bonus: 1,
            })
            .collect()
    }

    fn render(items: &[Item], marker: ProposalMarker, compact: bool) -> Vec<ViewField> {
        let locked = matches!(marker, ProposalMarker::Locked | ProposalMarker::Accepted);
        render_with(items, marker, locked, compact)
    }

    fn render_with(
        items: &[Item],
        marker: ProposalMarker,
        locked: bool,
        compact: bool,
    ) -> Vec<ViewField> {
        let participant = Participant::new(PlayerId::new(1), "alice");
        TextRenderer.proposal_fields(
            &ProposalSnapshot {
                participant: &participant,
                marker,
                locked,
                items,
            },
            compact,
        )
    }

    #[test]
    fn empty_proposal_renders_placeholder() {
        let fields = render(&[], ProposalMarker::None, false);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "alice");
        assert_eq!(fields[0].value, EMPTY_PROPOSAL);
    }

    #[test]
    fn marker_prefixes_heading_and_styles_lines() {
        let list = items(2, "Peru");
        let locked = render(&list, ProposalMarker::Locked, false);
        assert!(locked[0].name.starts_with('\u{1F512}'));
        assert!(locked[0].value.starts_with("- *#1 Peru"));

        let cancelled = render_with(&list, ProposalMarker::Cancelled, true, false);
        assert!(cancelled[0].value.starts_with("~~- *#1 Peru"));
    }

    #[test]
    fn cancelled_selection_is_struck_but_not_italic() {
        let list = items(2, "Peru");
        let fields = render_with(&list, ProposalMarker::Cancelled, false, false);
        assert!(fields[0].name.starts_with('\u{1F6AB}'));
        assert!(fields[0].value.starts_with("~~- #1 Peru"));
        assert!(!fields[0].value.contains('*'));
    }

    #[test]
    fn long_proposals_page_without_splitting_lines() {
        let long_name = "X".repeat(200);
        let list = items(12, &long_name);
        let fields = render(&list, ProposalMarker::None, true);
        assert!(fields.len() > 1);
        for field in &fields {
            assert!(field.value.chars().count() <= MAX_FIELD_LEN);
            if field.value != BLANK {
                assert!(field.value.ends_with('\n'));
            }
        }
        let total_lines: usize = fields
            .iter()
            .map(|f| f.value.matches("- #").count())
            .sum();
        assert_eq!(total_lines, 12);
    }

    #[test]
    fn compact_is_shorter() {
        let list = items(5, "Chile");
        let full: usize = render(&list, ProposalMarker::None, false)
            .iter()
            .map(ViewField::len)
            .sum();
        let compact: usize = render(&list, ProposalMarker::None, true)
            .iter()
            .map(ViewField::len)
            .sum();
        assert!(compact < full);
    }

    #[test]
    fn rendering_is_idempotent() {
        let list = items(3, "Chad");
        assert_eq!(
            render(&list, ProposalMarker::Accepted, false),
            render(&list, ProposalMarker::Accepted, false)
        );
    }
}
