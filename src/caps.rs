//! Capabilities string parsing.
//!
//! Displays describe themselves with a parenthesized text blob along the
//! lines of:
//!
//! ```text
//! (prot(monitor)type(lcd)model(U2415)cmds(01 02 03 0C E3 F3)
//!  vcp(02 04 10 12 14(04 05 08) 60(0F 11) DF)mccs_ver(2.1))
//! ```
//!
//! The parser keeps every feature code it sees, known or not, so the profile
//! round-trips what the display claimed; an empty permitted-value set means
//! the feature takes a continuous range.

use {
    crate::error::ProtocolError,
    std::collections::{BTreeMap, BTreeSet},
};

/// Parsed capabilities of one display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitiesProfile {
    /// Model string from the `model(...)` group.
    pub model: Option<String>,
    /// MCCS version from the `mccs_ver(...)` group.
    pub mccs_version: Option<(u8, u8)>,
    /// Command opcodes from the `cmds(...)` group.
    pub commands: BTreeSet<u8>,
    /// Supported feature codes mapped to their permitted discrete values.
    ///
    /// An empty set means the feature accepts a continuous range.
    pub features: BTreeMap<u8, BTreeSet<u16>>,
}

impl CapabilitiesProfile {
    /// Permitted discrete values for a feature, if the display lists it.
    pub fn permitted(&self, code: u8) -> Option<&BTreeSet<u16>> {
        self.features.get(&code)
    }

    /// Whether the display lists the feature at all.
    pub fn supports(&self, code: u8) -> bool {
        self.features.contains_key(&code)
    }
}

#[derive(Debug)]
enum Item {
    Token(String),
    Group(Vec<Item>),
}

/// Parse a capabilities string into a profile.
///
/// Fails with [`ProtocolError::MalformedCapabilities`] on unbalanced
/// groups; this is a hard error, never retried.
pub fn parse(s: &str) -> Result<CapabilitiesProfile, ProtocolError> {
    let items = parse_items(s)?;
    let mut profile = CapabilitiesProfile::default();
    interpret(&items, &mut profile);
    Ok(profile)
}

fn parse_items(s: &str) -> Result<Vec<Item>, ProtocolError> {
    // Stack of open groups; the bottom entry is the top-level sequence.
    let mut stack: Vec<Vec<Item>> = vec![Vec::new()];
    let mut token = String::new();

    for c in s.chars() {
        match c {
            '(' => {
                flush_token(&mut token, &mut stack);
                stack.push(Vec::new());
            },
            ')' => {
                flush_token(&mut token, &mut stack);
                let group = stack.pop().expect("stack never empty");
                match stack.last_mut() {
                    Some(parent) => parent.push(Item::Group(group)),
                    None => {
                        return Err(ProtocolError::MalformedCapabilities(
                            "unmatched closing parenthesis".into(),
                        ))
                    },
                }
            },
            c if c.is_whitespace() => flush_token(&mut token, &mut stack),
            c => token.push(c),
        }
    }
    flush_token(&mut token, &mut stack);

    if stack.len() != 1 {
        return Err(ProtocolError::MalformedCapabilities(format!(
            "{} unclosed group(s)",
            stack.len() - 1
        )));
    }
    Ok(stack.pop().expect("stack never empty"))
}

fn flush_token(token: &mut String, stack: &mut Vec<Vec<Item>>) {
    if !token.is_empty() {
        let group = stack.last_mut().expect("stack never empty");
        group.push(Item::Token(std::mem::take(token)));
    }
}

fn interpret(items: &[Item], profile: &mut CapabilitiesProfile) {
    let mut ndx = 0;
    while ndx < items.len() {
        match &items[ndx] {
            Item::Token(word) => {
                let code = hex_byte(word);
                if let Some(Item::Group(group)) = items.get(ndx + 1) {
                    match code {
                        // A group straight after a feature code lists its
                        // permitted values.
                        Some(code) => {
                            let permitted = profile.features.entry(code).or_default();
                            for item in group {
                                if let Item::Token(t) = item {
                                    if let Some(value) = hex_value(t) {
                                        permitted.insert(value);
                                    }
                                }
                            }
                        },
                        // A non-hex word labels a section.
                        None => interpret_section(word, group, profile),
                    }
                    ndx += 2;
                    continue;
                }
                if let Some(code) = code {
                    profile.features.entry(code).or_default();
                }
                ndx += 1;
            },
            // Unlabeled groups hold feature lists.
            Item::Group(group) => {
                interpret(group, profile);
                ndx += 1;
            },
        }
    }
}

fn interpret_section(label: &str, group: &[Item], profile: &mut CapabilitiesProfile) {
    match label.to_ascii_lowercase().as_str() {
        "vcp" => interpret(group, profile),
        "cmds" => {
            for item in group {
                if let Item::Token(t) = item {
                    if let Some(code) = hex_byte(t) {
                        profile.commands.insert(code);
                    }
                }
            }
        },
        "model" => {
            let words: Vec<&str> = group
                .iter()
                .filter_map(|item| match item {
                    Item::Token(t) => Some(t.as_str()),
                    Item::Group(..) => None,
                })
                .collect();
            if !words.is_empty() {
                profile.model = Some(words.join(" "));
            }
        },
        "mccs_ver" => {
            if let Some(Item::Token(t)) = group.first() {
                let mut parts = t.splitn(2, '.');
                let major = parts.next().and_then(|p| p.parse().ok());
                let minor = parts.next().and_then(|p| p.parse().ok());
                if let (Some(major), Some(minor)) = (major, minor) {
                    profile.mccs_version = Some((major, minor));
                }
            }
        },
        // prot, type, vdif and anything vendor-specific carry nothing the
        // session needs.
        _ => {},
    }
}

fn hex_byte(token: &str) -> Option<u8> {
    if token.len() > 2 {
        return None;
    }
    u8::from_str_radix(token, 16).ok()
}

fn hex_value(token: &str) -> Option<u16> {
    if token.len() > 4 {
        return None;
    }
    u16::from_str_radix(token, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_groups_are_feature_lists() {
        let profile = parse("(10 12 14)(F0)").unwrap();
        let codes: Vec<u8> = profile.features.keys().copied().collect();
        assert_eq!(codes, [0x10, 0x12, 0x14, 0xf0]);
        assert!(profile.features.values().all(|set| set.is_empty()));
    }

    #[test]
    fn unbalanced_input_is_malformed() {
        assert!(matches!(
            parse("(10 (12)"),
            Err(ProtocolError::MalformedCapabilities(..))
        ));
        assert!(matches!(
            parse("10))"),
            Err(ProtocolError::MalformedCapabilities(..))
        ));
    }

    #[test]
    fn parses_realistic_string() {
        let profile = parse(
            "(prot(monitor)type(LCD)model(U2415)\
             cmds(01 02 03 07 0C E3 F3)\
             vcp(02 04 05 08 10 12 14(04 05 08 0B) 16 18 1A 60(0F 11) DF)\
             mccs_ver(2.1))",
        )
        .unwrap();

        assert_eq!(profile.model.as_deref(), Some("U2415"));
        assert_eq!(profile.mccs_version, Some((2, 1)));
        assert!(profile.commands.contains(&0xf3));
        assert_eq!(profile.features.len(), 12);

        let presets = profile.permitted(0x14).unwrap();
        assert_eq!(
            presets.iter().copied().collect::<Vec<u16>>(),
            [0x04, 0x05, 0x08, 0x0b]
        );
        let inputs = profile.permitted(0x60).unwrap();
        assert!(inputs.contains(&0x0f) && inputs.contains(&0x11));

        // Continuous features carry an empty permitted set.
        assert!(profile.permitted(0x10).unwrap().is_empty());
    }

    #[test]
    fn unknown_codes_are_retained() {
        let profile = parse("(vcp(10 E5 F7(01 02)))").unwrap();
        assert!(profile.supports(0xe5));
        assert_eq!(profile.permitted(0xf7).unwrap().len(), 2);
    }

    #[test]
    fn empty_and_trivial_inputs() {
        assert_eq!(parse("").unwrap(), CapabilitiesProfile::default());
        assert!(parse("()").unwrap().features.is_empty());
    }
}
