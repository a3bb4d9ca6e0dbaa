//! Listener pattern matching.
//!
//! A caller waiting for a reply registers an [`Identifier`] describing the
//! messages it cares about. When a message arrives, its own identifier is
//! probed against every registered pattern and the most specific match wins.

/// One field of an [`Identifier`]: a wildcard, a single value, or a set of
/// acceptable values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Match<T> {
    /// Matches anything, including an unset probe field.
    #[default]
    Any,
    /// Matches that exact value, or any probe set containing it.
    Exact(T),
    /// Matches when the intersection with the probe side is non-empty.
    OneOf(Vec<T>),
}

impl<T: PartialEq> Match<T> {
    /// Whether this pattern field accepts the probed field.
    ///
    /// A set pattern never accepts an unset probe field: asking for
    /// `chat_id = 5` must not fire on a message with no chat at all.
    fn accepts(&self, probe: &Match<T>) -> bool {
        match (self, probe) {
            (Match::Any, _) => true,
            (_, Match::Any) => false,
            (Match::Exact(a), Match::Exact(b)) => a == b,
            (Match::Exact(a), Match::OneOf(b)) => b.contains(a),
            (Match::OneOf(a), Match::Exact(b)) => a.contains(b),
            (Match::OneOf(a), Match::OneOf(b)) => a.iter().any(|x| b.contains(x)),
        }
    }

    fn is_set(&self) -> bool {
        !matches!(self, Match::Any)
    }
}

impl<T> From<T> for Match<T> {
    fn from(value: T) -> Self {
        Match::Exact(value)
    }
}

impl<T> From<Vec<T>> for Match<T> {
    fn from(values: Vec<T>) -> Self {
        Match::OneOf(values)
    }
}

/// A pattern over the four correlation keys of an incoming message.
///
/// The same type doubles as the probe: an incoming message is described by
/// an `Identifier` whose set fields are its actual keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identifier {
    /// Inline message id, for callback-query correlation.
    pub inline_message_id: Match<String>,
    /// Chat the message belongs to.
    pub chat_id: Match<i64>,
    /// The message's own id.
    pub message_id: Match<i64>,
    /// Sender of the message.
    pub from_user_id: Match<i64>,
}

impl Identifier {
    /// True when every set field of this pattern accepts the corresponding
    /// field of `probe`. An empty pattern matches anything.
    pub fn matches(&self, probe: &Identifier) -> bool {
        self.inline_message_id.accepts(&probe.inline_message_id)
            && self.chat_id.accepts(&probe.chat_id)
            && self.message_id.accepts(&probe.message_id)
            && self.from_user_id.accepts(&probe.from_user_id)
    }

    /// How many fields this pattern constrains.
    pub fn specificity(&self) -> usize {
        usize::from(self.inline_message_id.is_set())
            + usize::from(self.chat_id.is_set())
            + usize::from(self.message_id.is_set())
            + usize::from(self.from_user_id.is_set())
    }

    /// Pick the matching pattern that constrains the most fields.
    ///
    /// Ties resolve to the earliest pattern in iteration order, so among
    /// equally specific listeners the one registered first wins.
    pub fn most_specific<'a, I>(patterns: I, probe: &Identifier) -> Option<&'a Identifier>
    where
        I: IntoIterator<Item = &'a Identifier>,
    {
        let mut best: Option<(&'a Identifier, usize)> = None;
        for pattern in patterns {
            if !pattern.matches(probe) {
                continue;
            }
            let score = pattern.specificity();
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((pattern, score));
            }
        }
        best.map(|(pattern, _)| pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(chat_id: i64, message_id: i64) -> Identifier {
        Identifier {
            chat_id: chat_id.into(),
            message_id: message_id.into(),
            ..Identifier::default()
        }
    }

    #[test]
    fn partial_pattern_matches_fuller_probe() {
        let pattern = Identifier { chat_id: 5.into(), ..Identifier::default() };
        assert!(pattern.matches(&probe(5, 10)));
    }

    #[test]
    fn list_pattern_needs_an_intersection() {
        let pattern = Identifier { chat_id: vec![5, 6].into(), ..Identifier::default() };
        assert!(!pattern.matches(&probe(7, 1)));
        assert!(pattern.matches(&probe(6, 1)));
    }

    #[test]
    fn empty_pattern_matches_anything() {
        let pattern = Identifier::default();
        assert!(pattern.matches(&probe(123, 456)));
        assert!(pattern.matches(&Identifier::default()));
        assert!(pattern.matches(&Identifier {
            inline_message_id: "AqAbc".to_string().into(),
            ..Identifier::default()
        }));
    }

    #[test]
    fn set_pattern_rejects_unset_probe_field() {
        let pattern = Identifier { chat_id: 5.into(), ..Identifier::default() };
        assert!(!pattern.matches(&Identifier::default()));
    }

    #[test]
    fn scalar_pattern_matches_membership_in_probe_list() {
        let pattern = Identifier { chat_id: 5.into(), ..Identifier::default() };
        let multi = Identifier { chat_id: vec![4, 5].into(), ..Identifier::default() };
        assert!(pattern.matches(&multi));

        let disjoint = Identifier { chat_id: vec![8, 9].into(), ..Identifier::default() };
        assert!(!pattern.matches(&disjoint));
    }

    #[test]
    fn list_to_list_intersects() {
        let pattern = Identifier { message_id: vec![1, 2, 3].into(), ..Identifier::default() };
        let overlapping = Identifier { message_id: vec![3, 4].into(), ..Identifier::default() };
        let disjoint = Identifier { message_id: vec![4, 5].into(), ..Identifier::default() };
        assert!(pattern.matches(&overlapping));
        assert!(!pattern.matches(&disjoint));
    }

    #[test]
    fn most_specific_pattern_wins() {
        let loose = Identifier { chat_id: 5.into(), ..Identifier::default() };
        let tight = Identifier {
            chat_id: 5.into(),
            from_user_id: 77.into(),
            ..Identifier::default()
        };
        let listeners = [loose.clone(), tight.clone()];

        let message = Identifier {
            chat_id: 5.into(),
            message_id: 10.into(),
            from_user_id: 77.into(),
            ..Identifier::default()
        };
        assert_eq!(Identifier::most_specific(&listeners, &message), Some(&tight));
    }

    #[test]
    fn ties_go_to_the_first_registered() {
        let first = Identifier { chat_id: 5.into(), ..Identifier::default() };
        let second = Identifier { from_user_id: 77.into(), ..Identifier::default() };
        let listeners = [first.clone(), second.clone()];

        let message = Identifier {
            chat_id: 5.into(),
            from_user_id: 77.into(),
            ..Identifier::default()
        };
        let chosen = Identifier::most_specific(&listeners, &message).unwrap();
        assert_eq!(chosen, &first);
    }

    #[test]
    fn no_match_yields_none() {
        let listeners = [Identifier { chat_id: 1.into(), ..Identifier::default() }];
        assert_eq!(Identifier::most_specific(&listeners, &probe(2, 1)), None);
    }
}
