use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::launcher::ContextHost;
use crate::locator::LocatorStrategy;
use crate::page::{Control, ControlKind, Page, PageEvent, SelectOption};

/// Supported browser types.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BrowserType {
    /// Mozilla Firefox
    Firefox,
    /// Google Chrome/Chromium
    Chrome,
}

impl std::str::FromStr for BrowserType {
    type Err = anyhow::Error;

    /// Parse browser type from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "firefox" => Ok(BrowserType::Firefox),
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            _ => anyhow::bail!("Unsupported browser: {}", s),
        }
    }
}

impl BrowserType {
    /// Get the WebDriver URL for this browser type
    pub fn get_webdriver_url(&self) -> String {
        match self {
            BrowserType::Firefox => "http://localhost:4444".to_string(),
            BrowserType::Chrome => "http://localhost:9515".to_string(),
        }
    }
}

/// WebDriver-backed page driver. The WebDriver endpoint is an external
/// collaborator: it must already be running, and this crate reports an
/// actionable connection error rather than managing driver processes.
pub struct WebBrowser {
    client: Client,
    browser_type: BrowserType,
    /// Our context ids → WebDriver window handles.
    contexts: DashMap<String, WindowHandle>,
    active: Mutex<String>,
}

impl WebBrowser {
    pub async fn new(browser_type: BrowserType, headless: bool) -> Result<Self> {
        info!("Connecting to {:?} WebDriver", browser_type);

        let webdriver_url = browser_type.get_webdriver_url();
        if !Self::is_webdriver_running(&webdriver_url).await {
            let driver_name = match browser_type {
                BrowserType::Firefox => "geckodriver",
                BrowserType::Chrome => "chromedriver",
            };

            anyhow::bail!(
                "Cannot connect to {} WebDriver at {}.\n\
                Please ensure {} is running:\n\
                  For Firefox: geckodriver --port 4444\n\
                  For Chrome: chromedriver --port 9515",
                driver_name,
                webdriver_url,
                driver_name
            );
        }

        let mut caps = serde_json::Map::new();
        match &browser_type {
            BrowserType::Firefox => {
                let mut args = Vec::new();
                if headless {
                    args.push("--headless".to_string());
                }
                caps.insert(
                    "moz:firefoxOptions".to_string(),
                    json!({ "args": args }),
                );
            }
            BrowserType::Chrome => {
                let mut args = vec!["--no-sandbox".to_string()];
                if headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                    args.push("--disable-dev-shm-usage".to_string());
                }
                caps.insert(
                    "goog:chromeOptions".to_string(),
                    json!({ "args": args }),
                );
            }
        }

        debug!("Connecting to WebDriver at {}", webdriver_url);
        let client = ClientBuilder::rustls()
            .capabilities(caps)
            .connect(&webdriver_url)
            .await
            .context("Failed to connect to WebDriver")?;

        let initial = client.window().await?;
        let contexts = DashMap::new();
        contexts.insert("main".to_string(), initial);

        Ok(WebBrowser {
            client,
            browser_type,
            contexts,
            active: Mutex::new("main".to_string()),
        })
    }

    async fn is_webdriver_running(url: &str) -> bool {
        let status_url = format!("{}/status", url);
        match reqwest::get(&status_url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub fn browser_type(&self) -> BrowserType {
        self.browser_type
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.client
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))
    }

    pub async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }

    /// Descriptor stored in a control handle so later operations re-resolve
    /// the element; that way a re-rendered element is picked up again
    /// instead of a stale reference erroring out.
    fn descriptor_for(strategy: &LocatorStrategy) -> serde_json::Value {
        match strategy {
            LocatorStrategy::NthOfKind { tag, index } => {
                json!({ "nth": { "tag": tag, "index": index } })
            }
            other => json!({ "css": other.as_css() }),
        }
    }

    fn handle_value(control: &Control) -> Result<serde_json::Value> {
        serde_json::from_str(&control.handle).context("corrupt control handle")
    }

    async fn exec_on_control(
        &self,
        control: &Control,
        body: &str,
        mut extra_args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let script = format!(
            r#"
            const h = arguments[0];
            let el = null;
            if (h.css) {{ el = document.querySelector(h.css); }}
            else if (h.nth) {{ el = document.querySelectorAll(h.nth.tag)[h.nth.index] || null; }}
            if (!el) {{ return {{ __missing: true }}; }}
            {body}
            "#
        );
        let mut args = vec![Self::handle_value(control)?];
        args.append(&mut extra_args);
        let result = self
            .client
            .execute(&script, args)
            .await
            .context("Failed to execute script")?;
        if result.get("__missing").and_then(|v| v.as_bool()) == Some(true) {
            anyhow::bail!("control no longer present in document");
        }
        Ok(result)
    }

    fn activate_handle(&self, context: &str) -> Result<WindowHandle> {
        self.contexts
            .get(context)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| anyhow::anyhow!("unknown context: {context}"))
    }
}

#[async_trait]
impl Page for WebBrowser {
    async fn document_id(&self) -> Result<String> {
        Ok(self.active.lock().unwrap().clone())
    }

    async fn find(&self, strategy: &LocatorStrategy) -> Result<Option<Control>> {
        let descriptor = Self::descriptor_for(strategy);
        let script = r#"
            const h = arguments[0];
            let el = null;
            if (h.css) { el = document.querySelector(h.css); }
            else if (h.nth) { el = document.querySelectorAll(h.nth.tag)[h.nth.index] || null; }
            if (!el) { return null; }
            return el.tagName.toLowerCase();
        "#;
        let result = self
            .client
            .execute(script, vec![descriptor.clone()])
            .await
            .context("Failed to query document")?;
        let Some(tag) = result.as_str() else {
            return Ok(None);
        };
        let kind = match tag {
            "select" => ControlKind::Select,
            "textarea" => ControlKind::TextArea,
            _ => ControlKind::Text,
        };
        Ok(Some(Control {
            handle: descriptor.to_string(),
            kind,
        }))
    }

    async fn read_value(&self, control: &Control) -> Result<String> {
        let result = self
            .exec_on_control(control, "return { value: el.value };", vec![])
            .await?;
        Ok(result
            .get("value")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn write_value(&self, control: &Control, value: &str) -> Result<()> {
        self.exec_on_control(
            control,
            "el.value = arguments[1]; return {};",
            vec![json!(value)],
        )
        .await?;
        Ok(())
    }

    async fn dispatch(&self, control: &Control, event: PageEvent) -> Result<()> {
        self.exec_on_control(
            control,
            "el.dispatchEvent(new Event(arguments[1], { bubbles: true })); return {};",
            vec![json!(event.dom_name())],
        )
        .await?;
        Ok(())
    }

    async fn options(&self, control: &Control) -> Result<Vec<SelectOption>> {
        let result = self
            .exec_on_control(
                control,
                r#"return {
                    options: Array.from(el.options || []).map(o => ({ value: o.value, label: o.text }))
                };"#,
                vec![],
            )
            .await?;
        let options = result
            .get("options")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(options).unwrap_or_default())
    }

    async fn select_option(&self, control: &Control, value: &str) -> Result<()> {
        let result = self
            .exec_on_control(
                control,
                r#"
                const wanted = arguments[1];
                const hit = Array.from(el.options || []).find(o => o.value === wanted);
                if (!hit) { return { selected: false }; }
                el.value = hit.value;
                el.dispatchEvent(new Event('change', { bubbles: true }));
                return { selected: true };
                "#,
                vec![json!(value)],
            )
            .await?;
        if result.get("selected").and_then(|v| v.as_bool()) != Some(true) {
            anyhow::bail!("no option with value {value}");
        }
        Ok(())
    }

    async fn highlight(&self, control: &Control, duration: Duration) -> Result<()> {
        self.exec_on_control(
            control,
            r#"
            el.style.backgroundColor = '#e8f5e9';
            setTimeout(() => { el.style.backgroundColor = ''; }, arguments[1]);
            return {};
            "#,
            vec![json!(duration.as_millis() as u64)],
        )
        .await?;
        Ok(())
    }

    async fn scroll_into_view(&self, control: &Control) -> Result<()> {
        self.exec_on_control(
            control,
            "el.scrollIntoView({ behavior: 'smooth', block: 'center' }); return {};",
            vec![],
        )
        .await?;
        Ok(())
    }

    async fn disable_submit_controls(&self, note: &str) -> Result<usize> {
        let script = r#"
            const note = arguments[0];
            const buttons = document.querySelectorAll(
                'input[type="submit"], button[type="submit"], input[value*="Submit"], button[onclick*="submit"]'
            );
            buttons.forEach(btn => {
                btn.disabled = true;
                btn.style.opacity = '0.5';
                btn.style.cursor = 'not-allowed';
                btn.title = note;
            });
            return buttons.length;
        "#;
        let result = self
            .client
            .execute(script, vec![json!(note)])
            .await
            .context("Failed to disable submit controls")?;
        Ok(result.as_u64().unwrap_or(0) as usize)
    }
}

#[async_trait]
impl ContextHost for WebBrowser {
    async fn current_context(&self) -> Result<String> {
        Ok(self.active.lock().unwrap().clone())
    }

    async fn open_context(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .new_window(true)
            .await
            .context("Failed to open a new window")?;

        let id = format!("ctx-{}", Uuid::new_v4());
        self.contexts.insert(id.clone(), response.handle.clone());

        self.client.switch_to_window(response.handle).await?;
        *self.active.lock().unwrap() = id.clone();
        self.goto(url).await?;

        info!(context = %id, %url, "opened automation context");
        Ok(Some(id))
    }

    async fn activate(&self, context: &str) -> Result<()> {
        let handle = self.activate_handle(context)?;
        self.client.switch_to_window(handle).await?;
        *self.active.lock().unwrap() = context.to_string();
        Ok(())
    }

    async fn close_context(&self, context: &str) -> Result<()> {
        let handle = self.activate_handle(context)?;
        self.client.switch_to_window(handle).await?;
        self.client.close_window().await?;
        self.contexts.remove(context);
        Ok(())
    }
}
