//! Mock dashboard API with the development dataset.
//!
//! Each endpoint answers after a fixed latency, the way the hosted mock
//! backend does, and any endpoint can be switched to answer with a failed
//! envelope or to fail without answering. Writes (mark as read, preference
//! updates) change what later reads return.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use hooks::dashboard::DashboardApi;
use jiff::{Timestamp, ToSpan};
use payloads::responses::{
    AreaPoint, ChangeType, DistributionSlice, Notification, NotificationKind,
    Preferences, RevenuePoint, SalesPoint, Stat, Theme, UserProfile,
};
use payloads::{Envelope, NotificationId, Period, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Stats,
    Revenue,
    Sales,
    Distribution,
    Area,
    Notifications,
    MarkNotificationRead,
    UserProfile,
    UpdatePreferences,
}

impl Endpoint {
    /// Latency of the hosted mock backend.
    pub fn default_latency(&self) -> Duration {
        let ms = match self {
            Endpoint::Stats => 500,
            Endpoint::Revenue => 300,
            Endpoint::Sales => 200,
            Endpoint::Distribution => 250,
            Endpoint::Area => 350,
            Endpoint::Notifications => 400,
            Endpoint::MarkNotificationRead => 100,
            Endpoint::UserProfile => 200,
            Endpoint::UpdatePreferences => 100,
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Answer with `success: false` and this message.
    Business(String),
    /// Fail without answering.
    Fault(String),
}

#[derive(Default)]
struct MockState {
    failures: HashMap<Endpoint, Failure>,
    calls: HashMap<Endpoint, usize>,
    periods: Vec<(Endpoint, Period)>,
}

pub struct MockDashboardApi {
    latency: Option<Duration>,
    state: Mutex<MockState>,
    notifications: Mutex<Vec<Notification>>,
    profile: Mutex<UserProfile>,
}

impl Default for MockDashboardApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDashboardApi {
    /// Mock with the per-endpoint latencies of the hosted mock backend.
    pub fn new() -> Self {
        Self {
            latency: None,
            state: Mutex::new(MockState::default()),
            notifications: Mutex::new(notifications(Timestamp::now())),
            profile: Mutex::new(profile()),
        }
    }

    /// Mock where every endpoint answers after `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new()
        }
    }

    /// Make `endpoint` fail until [`Self::recover`] is called.
    pub fn fail(&self, endpoint: Endpoint, failure: Failure) {
        self.state.lock().unwrap().failures.insert(endpoint, failure);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.state.lock().unwrap().failures.remove(&endpoint);
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&endpoint)
            .copied()
            .unwrap_or(0)
    }

    /// Periods requested from `endpoint`, in order.
    pub fn requested_periods(&self, endpoint: Endpoint) -> Vec<Period> {
        self.state
            .lock()
            .unwrap()
            .periods
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .map(|(_, period)| *period)
            .collect()
    }

    pub fn preferences(&self) -> Preferences {
        self.profile.lock().unwrap().preferences.clone()
    }

    async fn respond<T>(
        &self,
        endpoint: Endpoint,
        data: impl FnOnce() -> T,
    ) -> anyhow::Result<Envelope<T>> {
        let failure = {
            let mut state = self.state.lock().unwrap();
            *state.calls.entry(endpoint).or_default() += 1;
            state.failures.get(&endpoint).cloned()
        };
        // the answer reflects the data when the request arrived
        let answer = match failure {
            Some(Failure::Business(message)) => Ok(Envelope::failure(message)),
            Some(Failure::Fault(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(Envelope::ok(data())),
        };

        let latency =
            self.latency.unwrap_or_else(|| endpoint.default_latency());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        answer
    }

    fn record_period(&self, endpoint: Endpoint, period: Period) {
        self.state.lock().unwrap().periods.push((endpoint, period));
    }
}

impl DashboardApi for MockDashboardApi {
    async fn stats(&self) -> anyhow::Result<Envelope<Vec<Stat>>> {
        self.respond(Endpoint::Stats, stats).await
    }

    async fn revenue(
        &self,
        period: Period,
    ) -> anyhow::Result<Envelope<Vec<RevenuePoint>>> {
        self.record_period(Endpoint::Revenue, period);
        self.respond(Endpoint::Revenue, revenue).await
    }

    async fn sales(
        &self,
        period: Period,
    ) -> anyhow::Result<Envelope<Vec<SalesPoint>>> {
        self.record_period(Endpoint::Sales, period);
        self.respond(Endpoint::Sales, sales).await
    }

    async fn distribution(
        &self,
    ) -> anyhow::Result<Envelope<Vec<DistributionSlice>>> {
        self.respond(Endpoint::Distribution, distribution).await
    }

    async fn area(&self) -> anyhow::Result<Envelope<Vec<AreaPoint>>> {
        self.respond(Endpoint::Area, area).await
    }

    async fn notifications(
        &self,
    ) -> anyhow::Result<Envelope<Vec<Notification>>> {
        self.respond(Endpoint::Notifications, || {
            self.notifications.lock().unwrap().clone()
        })
        .await
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
    ) -> anyhow::Result<Envelope<()>> {
        let envelope =
            self.respond(Endpoint::MarkNotificationRead, || ()).await?;
        if envelope.success {
            for notification in self.notifications.lock().unwrap().iter_mut() {
                if notification.id == id {
                    notification.read = true;
                }
            }
        }
        Ok(envelope)
    }

    async fn user_profile(&self) -> anyhow::Result<Envelope<UserProfile>> {
        self.respond(Endpoint::UserProfile, || {
            self.profile.lock().unwrap().clone()
        })
        .await
    }

    async fn update_preferences(
        &self,
        preferences: &Preferences,
    ) -> anyhow::Result<Envelope<()>> {
        let envelope =
            self.respond(Endpoint::UpdatePreferences, || ()).await?;
        if envelope.success {
            self.profile.lock().unwrap().preferences = preferences.clone();
        }
        Ok(envelope)
    }
}

fn stat(
    id: &str,
    title: &str,
    value: &str,
    change: &str,
    trend: &[i64],
    color: &str,
) -> Stat {
    Stat {
        id: id.into(),
        title: title.into(),
        value: value.into(),
        change: change.into(),
        change_type: ChangeType::Increase,
        trend: trend.to_vec(),
        color: color.into(),
    }
}

pub fn stats() -> Vec<Stat> {
    vec![
        stat(
            "revenue",
            "Total Revenue",
            "$45,231",
            "+20.1%",
            &[4000, 3000, 2000, 2780, 1890, 2390, 3490],
            "bg-blue-500",
        ),
        stat(
            "subscriptions",
            "Subscriptions",
            "2,425",
            "+180.1%",
            &[400, 300, 600, 800, 500, 700, 900],
            "bg-green-500",
        ),
        stat(
            "sales",
            "Sales",
            "12,234",
            "+19%",
            &[200, 400, 300, 500, 400, 600, 700],
            "bg-purple-500",
        ),
        stat(
            "active",
            "Active Now",
            "573",
            "+201%",
            &[100, 200, 150, 300, 250, 400, 573],
            "bg-orange-500",
        ),
    ]
}

pub fn revenue() -> Vec<RevenuePoint> {
    [
        ("Jan", 4000, 2400, 1600),
        ("Feb", 3000, 1398, 1602),
        ("Mar", 2000, 9800, -7800),
        ("Apr", 2780, 3908, -1128),
        ("May", 1890, 4800, -2910),
        ("Jun", 2390, 3800, -1410),
        ("Jul", 3490, 4300, -810),
        ("Aug", 4000, 2400, 1600),
        ("Sep", 3000, 1398, 1602),
        ("Oct", 2000, 9800, -7800),
        ("Nov", 2780, 3908, -1128),
        ("Dec", 1890, 4800, -2910),
    ]
    .into_iter()
    .map(|(name, revenue, profit, expenses)| RevenuePoint {
        name: name.into(),
        revenue,
        profit,
        expenses,
    })
    .collect()
}

pub fn sales() -> Vec<SalesPoint> {
    [
        ("Mon", 400, 500),
        ("Tue", 300, 450),
        ("Wed", 600, 550),
        ("Thu", 800, 600),
        ("Fri", 500, 520),
        ("Sat", 700, 650),
        ("Sun", 400, 400),
    ]
    .into_iter()
    .map(|(name, sales, target)| SalesPoint {
        name: name.into(),
        sales,
        target,
    })
    .collect()
}

pub fn distribution() -> Vec<DistributionSlice> {
    [
        ("Desktop", 45, "#3b82f6"),
        ("Mobile", 35, "#10b981"),
        ("Tablet", 15, "#8b5cf6"),
        ("Other", 5, "#f59e0b"),
    ]
    .into_iter()
    .map(|(name, value, color)| DistributionSlice {
        name: name.into(),
        value,
        color: color.into(),
    })
    .collect()
}

pub fn area() -> Vec<AreaPoint> {
    [
        ("Jan", 4000, 2400, 8000),
        ("Feb", 3000, 1398, 6000),
        ("Mar", 2000, 9800, 12000),
        ("Apr", 2780, 3908, 9500),
        ("May", 1890, 4800, 7800),
        ("Jun", 2390, 3800, 8900),
        ("Jul", 3490, 4300, 11200),
    ]
    .into_iter()
    .map(|(name, users, sessions, page_views)| AreaPoint {
        name: name.into(),
        users,
        sessions,
        page_views,
    })
    .collect()
}

/// Two unread notifications and one read one, stamped relative to `now`.
pub fn notifications(now: Timestamp) -> Vec<Notification> {
    vec![
        Notification {
            id: NotificationId(1),
            title: "New Sale".into(),
            message: "You have a new sale of $299".into(),
            kind: NotificationKind::Success,
            timestamp: now - 5.minutes(),
            read: false,
        },
        Notification {
            id: NotificationId(2),
            title: "System Update".into(),
            message: "Dashboard updated to version 2.1.0".into(),
            kind: NotificationKind::Info,
            timestamp: now - 30.minutes(),
            read: false,
        },
        Notification {
            id: NotificationId(3),
            title: "Low Stock Alert".into(),
            message: "Product inventory is running low".into(),
            kind: NotificationKind::Warning,
            timestamp: now - 2.hours(),
            read: true,
        },
    ]
}

pub fn profile() -> UserProfile {
    UserProfile {
        id: UserId(1),
        name: "John Doe".into(),
        email: "john.doe@example.com".into(),
        avatar: None,
        role: "Admin".into(),
        preferences: Preferences {
            theme: Theme::Dark,
            notifications: true,
            auto_refresh: true,
        },
    }
}
