//! Dashboard resources: one controller per data source, plus refresh
//! timers.

use std::collections::HashSet;
use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use payloads::responses::{
    AreaPoint, DistributionSlice, Notification, Preferences, RevenuePoint,
    SalesPoint, Stat, UserProfile,
};
use payloads::{APIClient, Envelope, NotificationId, Period};

use crate::controller::{
    FetchOptions, FetchTask, Producer, RequestController, producer,
};
use crate::error::{FetchError, RefreshError};
use crate::refresh::RefreshScheduler;
use crate::state::FetchState;
use crate::transform::{StatView, enrich_stats, unread_count};

/// An API answer, or the fault that kept one from arriving.
pub type ApiResult<T> = anyhow::Result<Envelope<T>>;

/// The dashboard API surface consumed by the resources below.
pub trait DashboardApi: Send + Sync + 'static {
    fn stats(&self) -> impl Future<Output = ApiResult<Vec<Stat>>> + Send;

    fn revenue(
        &self,
        period: Period,
    ) -> impl Future<Output = ApiResult<Vec<RevenuePoint>>> + Send;

    fn sales(
        &self,
        period: Period,
    ) -> impl Future<Output = ApiResult<Vec<SalesPoint>>> + Send;

    fn distribution(
        &self,
    ) -> impl Future<Output = ApiResult<Vec<DistributionSlice>>> + Send;

    fn area(&self) -> impl Future<Output = ApiResult<Vec<AreaPoint>>> + Send;

    fn notifications(
        &self,
    ) -> impl Future<Output = ApiResult<Vec<Notification>>> + Send;

    fn mark_notification_read(
        &self,
        id: NotificationId,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    fn user_profile(
        &self,
    ) -> impl Future<Output = ApiResult<UserProfile>> + Send;

    fn update_preferences(
        &self,
        preferences: &Preferences,
    ) -> impl Future<Output = ApiResult<()>> + Send;
}

impl DashboardApi for APIClient {
    async fn stats(&self) -> anyhow::Result<Envelope<Vec<Stat>>> {
        Ok(APIClient::stats(self).await?)
    }

    async fn revenue(
        &self,
        period: Period,
    ) -> anyhow::Result<Envelope<Vec<RevenuePoint>>> {
        Ok(APIClient::revenue(self, period).await?)
    }

    async fn sales(
        &self,
        period: Period,
    ) -> anyhow::Result<Envelope<Vec<SalesPoint>>> {
        Ok(APIClient::sales(self, period).await?)
    }

    async fn distribution(
        &self,
    ) -> anyhow::Result<Envelope<Vec<DistributionSlice>>> {
        Ok(APIClient::distribution(self).await?)
    }

    async fn area(&self) -> anyhow::Result<Envelope<Vec<AreaPoint>>> {
        Ok(APIClient::area(self).await?)
    }

    async fn notifications(
        &self,
    ) -> anyhow::Result<Envelope<Vec<Notification>>> {
        Ok(APIClient::notifications(self).await?)
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
    ) -> anyhow::Result<Envelope<()>> {
        Ok(APIClient::mark_notification_read(self, id).await?)
    }

    async fn user_profile(&self) -> anyhow::Result<Envelope<UserProfile>> {
        Ok(APIClient::user_profile(self).await?)
    }

    async fn update_preferences(
        &self,
        preferences: &Preferences,
    ) -> anyhow::Result<Envelope<()>> {
        Ok(APIClient::update_preferences(self, preferences).await?)
    }
}

pub type StatsController = RequestController<(), Vec<Stat>, Vec<StatView>>;

/// Stat cards, with display strings parsed into numbers before publishing.
pub fn stats_controller<Api: DashboardApi>(api: Arc<Api>) -> StatsController {
    let stats = producer(move |()| {
        let api = Arc::clone(&api);
        async move { api.stats().await }
    });
    RequestController::new(stats, FetchOptions::with_transform(enrich_stats))
}

pub fn distribution_controller<Api: DashboardApi>(
    api: Arc<Api>,
) -> RequestController<(), Vec<DistributionSlice>> {
    let distribution = producer(move |()| {
        let api = Arc::clone(&api);
        async move { api.distribution().await }
    });
    RequestController::new(distribution, FetchOptions::default())
}

pub fn area_controller<Api: DashboardApi>(
    api: Arc<Api>,
) -> RequestController<(), Vec<AreaPoint>> {
    let area = producer(move |()| {
        let api = Arc::clone(&api);
        async move { api.area().await }
    });
    RequestController::new(area, FetchOptions::default())
}

type ChartSource<T> = Arc<dyn Fn(Period) -> Producer<(), Vec<T>> + Send + Sync>;

/// A chart whose data depends on the selected [`Period`].
///
/// The period is the controller's only dependency: changing it rebuilds the
/// producer and refetches, setting the same period again does nothing.
pub struct ChartResource<T> {
    period: Period,
    source: ChartSource<T>,
    controller: RequestController<(), Vec<T>>,
}

impl<T: Clone + Send + Sync + 'static> ChartResource<T> {
    fn with_source<F>(period: Period, source: F) -> Self
    where
        F: Fn(Period) -> Producer<(), Vec<T>> + Send + Sync + 'static,
    {
        let controller =
            RequestController::new(source(period), FetchOptions::default());
        Self {
            period,
            source: Arc::new(source),
            controller,
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// Switch to `period`, refetching if it differs from the current one.
    pub fn set_period(&mut self, period: Period) -> Option<FetchTask> {
        if period == self.period {
            return None;
        }
        tracing::debug!(
            from = %self.period,
            to = %period,
            "chart period changed"
        );
        self.period = period;
        self.controller.reconfigure((self.source)(period))
    }
}

impl ChartResource<RevenuePoint> {
    pub fn revenue<Api: DashboardApi>(api: Arc<Api>, period: Period) -> Self {
        Self::with_source(period, move |period| {
            let api = Arc::clone(&api);
            producer(move |()| {
                let api = Arc::clone(&api);
                async move { api.revenue(period).await }
            })
        })
    }
}

impl ChartResource<SalesPoint> {
    pub fn sales<Api: DashboardApi>(api: Arc<Api>, period: Period) -> Self {
        Self::with_source(period, move |period| {
            let api = Arc::clone(&api);
            producer(move |()| {
                let api = Arc::clone(&api);
                async move { api.sales(period).await }
            })
        })
    }
}

impl<T> Deref for ChartResource<T> {
    type Target = RequestController<(), Vec<T>>;

    fn deref(&self) -> &Self::Target {
        &self.controller
    }
}

#[derive(Default)]
struct UnreadTracker {
    count: usize,
    /// Marked read locally and not yet reported read by the server.
    marked: HashSet<NotificationId>,
}

impl UnreadTracker {
    /// Count unread notifications, treating local marks as read. Marks the
    /// server already reports read are dropped.
    fn recount(&mut self, notifications: &[Notification]) {
        self.count = unread_count(notifications, &self.marked);
        self.marked.retain(|id| {
            notifications.iter().any(|n| n.id == *id && !n.read)
        });
    }
}

/// Notifications plus an unread counter that follows local "mark as read"
/// actions until the next fetch brings the server's view.
pub struct NotificationsResource<Api> {
    api: Arc<Api>,
    unread: Arc<Mutex<UnreadTracker>>,
    controller: RequestController<(), Vec<Notification>>,
}

impl<Api: DashboardApi> NotificationsResource<Api> {
    pub fn new(api: Arc<Api>) -> Self {
        let unread = Arc::new(Mutex::new(UnreadTracker::default()));

        let notifications = {
            let api = Arc::clone(&api);
            producer(move |()| {
                let api = Arc::clone(&api);
                async move { api.notifications().await }
            })
        };
        let options = FetchOptions::default().on_success({
            let unread = Arc::clone(&unread);
            move |notifications: &Vec<Notification>| {
                unread
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .recount(notifications);
            }
        });

        Self {
            api,
            unread,
            controller: RequestController::new(notifications, options),
        }
    }

    pub fn unread_count(&self) -> usize {
        self.unread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .count
    }

    /// Mark a notification read on the server and update the unread count.
    ///
    /// Failures are logged and leave the count untouched.
    pub async fn mark_as_read(&self, id: NotificationId) {
        let result = match self.api.mark_notification_read(id).await {
            Ok(envelope) => FetchError::check(envelope),
            Err(e) => Err(FetchError::Unexpected(format!("{e:#}"))),
        };
        if let Err(e) = result {
            tracing::error!(
                notification_id = %id,
                kind = e.kind(),
                "Failed to mark notification as read: {e}"
            );
            return;
        }

        // a fetch completing meanwhile recounts under the same lock
        let mut unread =
            self.unread.lock().unwrap_or_else(PoisonError::into_inner);
        unread.marked.insert(id);
        let state = self.controller.state();
        if let FetchState::Fetched(notifications) = &state.data {
            unread.recount(notifications);
        }
    }
}

impl<Api> Deref for NotificationsResource<Api> {
    type Target = RequestController<(), Vec<Notification>>;

    fn deref(&self) -> &Self::Target {
        &self.controller
    }
}

/// The signed in user's profile.
pub struct UserResource<Api> {
    api: Arc<Api>,
    controller: RequestController<(), UserProfile>,
}

impl<Api: DashboardApi> UserResource<Api> {
    pub fn new(api: Arc<Api>) -> Self {
        let profile = {
            let api = Arc::clone(&api);
            producer(move |()| {
                let api = Arc::clone(&api);
                async move { api.user_profile().await }
            })
        };
        Self {
            api,
            controller: RequestController::new(
                profile,
                FetchOptions::default(),
            ),
        }
    }

    /// Save preferences, then refetch the profile so it reflects them.
    pub async fn update_preferences(
        &self,
        preferences: &Preferences,
    ) -> anyhow::Result<FetchTask> {
        let result = self
            .api
            .update_preferences(preferences)
            .await
            .and_then(|envelope| Ok(FetchError::check(envelope)?))
            .context("Failed to update preferences");
        if let Err(e) = &result {
            tracing::error!("{e:#}");
        }
        result?;
        Ok(self.controller.refetch(()))
    }
}

impl<Api> Deref for UserResource<Api> {
    type Target = RequestController<(), UserProfile>;

    fn deref(&self) -> &Self::Target {
        &self.controller
    }
}

/// Refresh periods per resource group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshIntervals {
    pub stats: Duration,
    pub charts: Duration,
    pub notifications: Duration,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            stats: Duration::from_secs(30),
            charts: Duration::from_secs(60),
            notifications: Duration::from_secs(15),
        }
    }
}

/// Every dashboard resource, refreshed on its group's interval while auto
/// refresh is on.
pub struct Dashboard<Api: DashboardApi> {
    // dropped first: timers stop before the controllers they trigger
    schedulers: Vec<RefreshScheduler>,
    pub stats: StatsController,
    pub revenue: ChartResource<RevenuePoint>,
    pub sales: ChartResource<SalesPoint>,
    pub distribution: RequestController<(), Vec<DistributionSlice>>,
    pub area: RequestController<(), Vec<AreaPoint>>,
    pub notifications: NotificationsResource<Api>,
    pub user: UserResource<Api>,
}

impl<Api: DashboardApi> Dashboard<Api> {
    pub fn new(
        api: Arc<Api>,
        period: Period,
        intervals: RefreshIntervals,
        auto_refresh: bool,
    ) -> Result<Self, RefreshError> {
        let stats = stats_controller(Arc::clone(&api));
        let revenue = ChartResource::revenue(Arc::clone(&api), period);
        let sales = ChartResource::sales(Arc::clone(&api), period);
        let distribution = distribution_controller(Arc::clone(&api));
        let area = area_controller(Arc::clone(&api));
        let notifications = NotificationsResource::new(Arc::clone(&api));
        let user = UserResource::new(api);

        let stats_refresh = stats.refetch_handle();
        let chart_refreshes = [
            revenue.refetch_handle(),
            sales.refetch_handle(),
            distribution.refetch_handle(),
            area.refetch_handle(),
        ];
        let notifications_refresh = notifications.refetch_handle();

        let schedulers = vec![
            RefreshScheduler::periodic(
                intervals.stats,
                move || {
                    let _ = stats_refresh.call(());
                },
                auto_refresh,
            )?,
            RefreshScheduler::periodic(
                intervals.charts,
                move || {
                    for refresh in &chart_refreshes {
                        let _ = refresh.call(());
                    }
                },
                auto_refresh,
            )?,
            RefreshScheduler::periodic(
                intervals.notifications,
                move || {
                    let _ = notifications_refresh.call(());
                },
                auto_refresh,
            )?,
        ];

        Ok(Self {
            schedulers,
            stats,
            revenue,
            sales,
            distribution,
            area,
            notifications,
            user,
        })
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) {
        for scheduler in &mut self.schedulers {
            if enabled {
                scheduler.resume();
            } else {
                scheduler.stop();
            }
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.schedulers.iter().any(RefreshScheduler::is_running)
    }

    /// Refetch everything now, e.g. from a retry button.
    pub fn refresh_all(&self) -> Vec<FetchTask> {
        vec![
            self.stats.refetch(()),
            self.revenue.refetch(()),
            self.sales.refetch(()),
            self.distribution.refetch(()),
            self.area.refetch(()),
            self.notifications.refetch(()),
            self.user.refetch(()),
        ]
    }
}
