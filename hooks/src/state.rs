/// Distinguishes "never fetched" from "fetched", independent of whether the
/// fetched value itself is empty.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    NotFetched,
    Fetched(T),
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        FetchState::NotFetched
    }
}

impl<T> FetchState<T> {
    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchState::Fetched(_))
    }

    pub fn as_ref(&self) -> Option<&T> {
        match self {
            FetchState::Fetched(data) => Some(data),
            FetchState::NotFetched => None,
        }
    }
}

/// Externally observable state of a [`crate::RequestController`].
///
/// Data survives failed refetches: a failure only sets `error`, so stale
/// data keeps being shown next to the error.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    pub data: FetchState<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> RequestState<T> {
    pub(crate) fn new(loading: bool) -> Self {
        Self {
            data: FetchState::NotFetched,
            loading,
            error: None,
        }
    }

    /// Returns true if this is the initial load (data not yet fetched,
    /// currently loading, and no error).
    pub fn is_initial_loading(&self) -> bool {
        self.loading && !self.data.is_fetched() && self.error.is_none()
    }

    /// Classify the state for display.
    ///
    /// - No data + loading: [`StateView::Loading`]
    /// - No data + error: [`StateView::Failed`]
    /// - No data, idle, no error: [`StateView::Empty`] (a controller that
    ///   was never started)
    /// - Has data: [`StateView::Ready`] with the refetch flags
    pub fn view(&self) -> StateView<'_, T> {
        match self.data.as_ref() {
            None if self.loading => StateView::Loading,
            None => match &self.error {
                Some(error) => StateView::Failed(error),
                None => StateView::Empty,
            },
            Some(data) => StateView::Ready {
                data,
                refreshing: self.loading,
                error: self.error.as_deref(),
            },
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum StateView<'a, T> {
    Loading,
    Failed(&'a str),
    Empty,
    Ready {
        data: &'a T,
        /// A refetch is in progress.
        refreshing: bool,
        /// Error from a failed refetch; `data` is from an earlier fetch.
        error: Option<&'a str>,
    },
}
