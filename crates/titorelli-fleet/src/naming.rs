// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container name generation.
//!
//! Every bot's workload is named `<prefix>-<account id>-<external id>`,
//! optionally followed by `-<suffix>` when a generation rotation is in effect
//! (e.g. `titorelli-bot-7-42-next`). Names are a pure function of their inputs
//! and can be recomputed without touching the store.

/// Generates and recognizes workload names for one prefix/suffix family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNameGenerator {
    prefix: String,
    suffix: Option<String>,
}

impl ContainerNameGenerator {
    /// Create a generator for the given prefix and optional generation suffix.
    ///
    /// An empty suffix is treated as no suffix.
    pub fn new(prefix: impl Into<String>, suffix: Option<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.filter(|s| !s.is_empty()),
        }
    }

    /// Name prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generation suffix, if any.
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Derive the workload name for a bot.
    pub fn generate(&self, account_id: i64, external_id: i64) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}-{}-{}-{}", self.prefix, account_id, external_id, suffix),
            None => format!("{}-{}-{}", self.prefix, account_id, external_id),
        }
    }

    /// Whether `name` was produced by this generator for any bot.
    ///
    /// Used to filter platform listings down to the workloads this fleet owns.
    pub fn matches(&self, name: &str) -> bool {
        self.parse(name).is_some()
    }

    /// Whether `name` is exactly the name this generator derives for the bot.
    pub fn matches_bot(&self, name: &str, account_id: i64, external_id: i64) -> bool {
        self.parse(name) == Some((account_id, external_id))
    }

    /// Recover `(account id, external id)` from a name produced by this generator.
    pub fn parse(&self, name: &str) -> Option<(i64, i64)> {
        let rest = name.strip_prefix(self.prefix.as_str())?.strip_prefix('-')?;
        let (account_id, rest) = take_int(rest)?;
        let rest = rest.strip_prefix('-')?;
        let (external_id, rest) = take_int(rest)?;

        match (&self.suffix, rest) {
            (None, "") => Some((account_id, external_id)),
            (Some(suffix), rest) if rest.strip_prefix('-') == Some(suffix.as_str()) => {
                Some((account_id, external_id))
            }
            _ => None,
        }
    }
}

/// Read one canonical decimal integer off the front of `input`.
fn take_int(input: &str) -> Option<(i64, &str)> {
    let sign_len = usize::from(input.starts_with('-'));
    let digits_len = input[sign_len..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits_len == 0 {
        return None;
    }

    let (number, rest) = input.split_at(sign_len + digits_len);
    let value: i64 = number.parse().ok()?;
    (value.to_string() == number).then_some((value, rest))
}
