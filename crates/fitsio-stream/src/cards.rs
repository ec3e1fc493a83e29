//! Ordered header card storage with a unique-keyword index.

use std::collections::HashMap;
use std::ops::Index;

use crate::error::{Error, ProtocolError, Result};
use crate::header::{normalize_keyword, Card};
use crate::value;

/// Characters of string content carried by one long-string card.
const LONG_STRING_CHUNK: usize = 67;

/// Ordered list of header cards.
///
/// Unique keywords are indexed for constant-time lookup; commentary keywords
/// (`COMMENT`, `CONTINUE`, blank, ...) may repeat and are never indexed. Once
/// the owning HDU leaves its initial state the collection is locked and all
/// public mutators fail with [`ProtocolError::HeaderNotModifiable`].
#[derive(Debug, Clone, Default)]
pub struct CardCollection {
    cards: Vec<Card>,
    index: HashMap<String, usize>,
    locked: bool,
}

impl CardCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Card> {
        self.cards.iter()
    }

    /// Keywords in list order, commentary keywords included.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cards.iter().map(Card::keyword)
    }

    /// Whether the owning HDU still accepts header changes.
    pub fn is_modifiable(&self) -> bool {
        !self.locked
    }

    pub(crate) fn lock(&mut self) {
        self.locked = true;
    }

    fn check_modifiable(&self) -> Result<()> {
        if self.locked {
            return Err(ProtocolError::HeaderNotModifiable.into());
        }
        Ok(())
    }

    // ── Lookup ──

    pub fn contains(&self, keyword: &str) -> bool {
        self.try_get(keyword).is_some()
    }

    /// Look up a unique keyword.
    pub fn try_get(&self, keyword: &str) -> Option<&Card> {
        let key = keyword.trim().to_ascii_uppercase();
        self.index.get(&key).map(|&i| &self.cards[i])
    }

    /// Look up `keyword` followed by a decimal index, e.g. `TFORM3`.
    pub fn try_get_indexed(&self, keyword: &str, index: usize) -> Option<&Card> {
        self.try_get(&format!("{}{index}", keyword.trim()))
    }

    /// Look up a unique keyword that must be present.
    pub fn get(&self, keyword: &str) -> Result<&Card> {
        self.try_get(keyword)
            .ok_or_else(|| Error::MissingKeyword(keyword.trim().to_ascii_uppercase()))
    }

    pub fn get_indexed(&self, keyword: &str, index: usize) -> Result<&Card> {
        self.get(&format!("{}{index}", keyword.trim()))
    }

    /// List position of a unique keyword.
    pub fn position(&self, keyword: &str) -> Option<usize> {
        self.index.get(&keyword.trim().to_ascii_uppercase()).copied()
    }

    // ── Mutation ──

    /// Append a card. Unique keywords may appear only once.
    pub fn add(&mut self, card: Card) -> Result<()> {
        self.check_modifiable()?;
        self.add_unchecked(card)
    }

    /// Replace the card with the same keyword in place, or append it.
    pub fn set(&mut self, card: Card) -> Result<()> {
        self.check_modifiable()?;
        self.set_unchecked(card)
    }

    /// Insert a card at list position `at`.
    pub fn insert(&mut self, at: usize, card: Card) -> Result<()> {
        self.check_modifiable()?;
        if !card.is_comment_like() && self.index.contains_key(card.keyword()) {
            return Err(Error::DuplicateKeyword(card.keyword().to_string()));
        }
        let at = at.min(self.cards.len());
        self.cards.insert(at, card);
        self.reindex();
        Ok(())
    }

    /// Remove a unique keyword. Returns the removed card, if any.
    pub fn remove(&mut self, keyword: &str) -> Result<Option<Card>> {
        self.check_modifiable()?;
        Ok(self.remove_unchecked(keyword))
    }

    pub fn remove_at(&mut self, at: usize) -> Result<Card> {
        self.check_modifiable()?;
        if at >= self.cards.len() {
            return Err(Error::MissingKeyword(format!("card #{at}")));
        }
        let card = self.cards.remove(at);
        self.reindex();
        Ok(card)
    }

    /// Remove every card whose keyword satisfies `pred`.
    pub fn remove_where(&mut self, pred: impl Fn(&str) -> bool) -> Result<()> {
        self.check_modifiable()?;
        self.cards.retain(|c| !pred(c.keyword()));
        self.reindex();
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.check_modifiable()?;
        self.cards.clear();
        self.index.clear();
        Ok(())
    }

    /// Stable sort into standard header order. `CONTINUE` cards move with the
    /// card they continue.
    pub fn sort(&mut self) -> Result<()> {
        self.check_modifiable()?;
        self.sort_unchecked();
        Ok(())
    }

    pub(crate) fn add_unchecked(&mut self, card: Card) -> Result<()> {
        if !card.is_comment_like() {
            if self.index.contains_key(card.keyword()) {
                return Err(Error::DuplicateKeyword(card.keyword().to_string()));
            }
            self.index.insert(card.keyword().to_string(), self.cards.len());
        }
        self.cards.push(card);
        Ok(())
    }

    pub(crate) fn set_unchecked(&mut self, card: Card) -> Result<()> {
        if card.is_comment_like() {
            return Err(Error::InvalidKeyword(card.keyword().to_string()));
        }
        match self.index.get(card.keyword()) {
            Some(&i) => self.cards[i] = card,
            None => {
                self.index.insert(card.keyword().to_string(), self.cards.len());
                self.cards.push(card);
            }
        }
        Ok(())
    }

    pub(crate) fn remove_unchecked(&mut self, keyword: &str) -> Option<Card> {
        let at = self.position(keyword)?;
        let card = self.cards.remove(at);
        self.reindex();
        Some(card)
    }

    pub(crate) fn sort_unchecked(&mut self) {
        let mut groups: Vec<Vec<Card>> = Vec::with_capacity(self.cards.len());
        for card in self.cards.drain(..) {
            match groups.last_mut() {
                Some(group) if card.keyword() == "CONTINUE" => group.push(card),
                _ => groups.push(vec![card]),
            }
        }
        groups.sort_by(|a, b| a[0].compare_order(&b[0]));
        self.cards = groups.into_iter().flatten().collect();
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .cards
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_comment_like())
            .map(|(i, c)| (c.keyword().to_string(), i))
            .collect();
    }

    // ── Long strings ──

    /// Read a string value, following `CONTINUE` cards while the value ends
    /// with `&`.
    pub fn long_string(&self, keyword: &str) -> Result<String> {
        let card = self.get(keyword)?;
        let mut out = card.get_string()?;
        let Some(start) = self.position(keyword) else {
            return Ok(out);
        };
        for next in &self.cards[start + 1..] {
            if !out.ends_with('&') || next.keyword() != "CONTINUE" {
                break;
            }
            let text = next.comment().unwrap_or("");
            let Some((Some(raw), _)) = value::split_value_field(text) else {
                break;
            };
            let Some(piece) = value::parse_string(raw) else {
                break;
            };
            out.pop();
            out.push_str(&piece);
        }
        Ok(out)
    }

    /// Write `value` as a chain of a keyword card and `CONTINUE` cards.
    ///
    /// Replaces any existing chain for `keyword` and adds the `LONGSTRN`
    /// marker card.
    pub fn set_long_string(&mut self, keyword: &str, value: &str) -> Result<()> {
        self.check_modifiable()?;
        let keyword = normalize_keyword(keyword)?;

        if let Some(at) = self.position(&keyword) {
            let chain_end = self.cards[at + 1..]
                .iter()
                .take_while(|c| c.keyword() == "CONTINUE")
                .count();
            self.cards.drain(at..at + 1 + chain_end);
            self.reindex();
        }

        let chunks = split_long_string(value);
        let last = chunks.len() - 1;
        let mut head = Card::new(&keyword)?;
        for (i, chunk) in chunks.iter().enumerate() {
            let mut piece = chunk.clone();
            if i != last {
                piece.push('&');
            }
            if i == 0 {
                head.set_string(&piece);
                self.add_unchecked(head.clone())?;
            } else {
                let text = value::format_string(&piece);
                self.add_unchecked(Card::text("CONTINUE", &text)?)?;
            }
        }

        if !self.contains("LONGSTRN") {
            let marker = Card::string("LONGSTRN", "OGIP 1.0")?
                .with_comment("The OGIP long string convention may be used");
            self.add_unchecked(marker)?;
        }
        Ok(())
    }
}

/// Cut `value` into pieces whose escaped form fits one card, never splitting
/// a quote from its escape.
fn split_long_string(value: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut width = 0;
    for ch in value.chars() {
        let cost = if ch == '\'' { 2 } else { 1 };
        if width + cost > LONG_STRING_CHUNK {
            chunks.push(std::mem::take(&mut current));
            width = 0;
        }
        current.push(ch);
        width += cost;
    }
    chunks.push(current);
    chunks
}

impl Index<usize> for CardCollection {
    type Output = Card;

    fn index(&self, index: usize) -> &Card {
        &self.cards[index]
    }
}

impl<'a> IntoIterator for &'a CardCollection {
    type Item = &'a Card;
    type IntoIter = std::slice::Iter<'a, Card>;

    fn into_iter(self) -> Self::IntoIter {
        self.cards.iter()
    }
}
