use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use url::Url;

use crate::browser::host::{Session, SessionHost, SessionId};
use crate::browser::signals::{NavSignal, NavTicket, NavigationSignals};
use crate::cli::config::BrowserSettings;
use crate::crawler::error::HostError;

/// Session host backed by Chrome behind a WebDriver endpoint
pub struct WebDriverHost {
    /// Browser settings
    config: BrowserSettings,

    /// Where navigation outcomes are reported
    signals: Arc<NavigationSignals>,

    /// Live WebDriver sessions
    drivers: Mutex<HashMap<SessionId, Arc<WebDriver>>>,
}

impl WebDriverHost {
    /// Create a new host reporting into `signals`
    pub fn new(config: BrowserSettings, signals: Arc<NavigationSignals>) -> Self {
        Self {
            config,
            signals,
            drivers: Mutex::new(HashMap::new()),
        }
    }

    async fn driver(&self, session: &Session) -> Result<Arc<WebDriver>, HostError> {
        self.drivers
            .lock()
            .await
            .get(&session.id())
            .cloned()
            .ok_or_else(|| HostError::UnknownSession(session.id().to_string()))
    }
}

#[async_trait]
impl SessionHost for WebDriverHost {
    async fn create_session(&self) -> Result<Session, HostError> {
        let mut caps = DesiredCapabilities::chrome();
        let invalid = |e: WebDriverError| HostError::Create(format!("invalid capabilities: {}", e));

        if let Some(user_agent) = &self.config.user_agent {
            caps.add_chrome_arg(&format!("--user-agent={}", user_agent)).map_err(invalid)?;
        }
        caps.add_chrome_arg(&format!(
            "--window-size={},{}",
            self.config.window_width, self.config.window_height
        )).map_err(invalid)?;
        if self.config.headless {
            caps.set_headless().map_err(invalid)?;
        }
        caps.add_chrome_arg("--disable-blink-features=AutomationControlled").map_err(invalid)?;
        caps.add_chrome_arg("--disable-dev-shm-usage").map_err(invalid)?;

        let driver = WebDriver::new(&self.config.webdriver_url, caps)
            .await
            .map_err(|e| HostError::Create(format!("failed to connect to WebDriver at {}: {}", self.config.webdriver_url, e)))?;

        driver
            .set_page_load_timeout(Duration::from_millis(self.config.page_load_timeout_ms))
            .await
            .map_err(|e| HostError::Create(e.to_string()))?;

        let session = Session::new(SessionId::new());
        self.drivers.lock().await.insert(session.id(), Arc::new(driver));

        debug!("Browser session {} initialized", session.id());

        Ok(session)
    }

    async fn navigate(&self, session: &Session, url: &Url, ticket: NavTicket) -> Result<(), HostError> {
        let driver = self.driver(session).await?;
        let signals = Arc::clone(&self.signals);
        let target = url.to_string();

        debug!("Navigating session {} to: {}", session.id(), target);

        tokio::spawn(async move {
            let signal = match driver.goto(&target).await {
                Ok(()) => NavSignal::Loaded,
                Err(e) => NavSignal::Failed(e.to_string()),
            };
            signals.emit(ticket, signal);
        });

        Ok(())
    }

    async fn page_source(&self, session: &Session) -> Result<String, HostError> {
        let driver = self.driver(session).await?;

        driver.source().await
            .map_err(|e| HostError::Page(e.to_string()))
    }

    async fn destroy_session(&self, session: Session) {
        let Some(driver) = self.drivers.lock().await.remove(&session.id()) else {
            warn!("Destroy requested for unknown session {}", session.id());
            return;
        };

        match Arc::try_unwrap(driver) {
            Ok(driver) => {
                if let Err(e) = driver.quit().await {
                    error!("Error closing browser session {}: {}", session.id(), e);
                }
            }
            Err(driver) => {
                // A navigation from an abandoned attempt still holds the driver
                if let Err(e) = driver.close_window().await {
                    error!("Error closing window of session {}: {}", session.id(), e);
                }
            }
        }

        debug!("Browser session {} closed", session.id());
    }
}
