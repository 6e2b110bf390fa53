/// Terminal result of a correlated call.
///
/// The bridge deliberately absorbs two non-success conditions into resolved
/// (non-error) outcomes so multi-step connect flows stay resilient:
/// `Recovered` marks a remote-reported error, `Unavailable` marks an
/// unreachable sub-context or an abandoned flow. Callers that need the
/// distinction can match on the variant; callers that only care about data
/// use [`CallOutcome::success`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// The sub-context answered affirmatively.
    Success(T),
    /// The sub-context reported an error; absorbed by policy.
    Recovered,
    /// The sub-context was unreachable, or the flow was cancelled/abandoned.
    Unavailable,
}

impl<T> CallOutcome<T> {
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            Self::Success(value) => CallOutcome::Success(f(value)),
            Self::Recovered => CallOutcome::Recovered,
            Self::Unavailable => CallOutcome::Unavailable,
        }
    }

    pub fn as_ref(&self) -> CallOutcome<&T> {
        match self {
            Self::Success(value) => CallOutcome::Success(value),
            Self::Recovered => CallOutcome::Recovered,
            Self::Unavailable => CallOutcome::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_extracts_value() {
        assert_eq!(CallOutcome::Success(7).success(), Some(7));
        assert_eq!(CallOutcome::<u32>::Recovered.success(), None);
        assert_eq!(CallOutcome::<u32>::Unavailable.success(), None);
    }

    #[test]
    fn map_preserves_non_success_variants() {
        assert_eq!(
            CallOutcome::Success(2).map(|n| n * 2),
            CallOutcome::Success(4)
        );
        assert_eq!(
            CallOutcome::<u32>::Recovered.map(|n| n * 2),
            CallOutcome::Recovered
        );
        assert_eq!(
            CallOutcome::<u32>::Unavailable.map(|n| n * 2),
            CallOutcome::Unavailable
        );
    }
}
