use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::locator::LocatorStrategy;

/// Kind of form control, resolved once at match time and carried on the
/// returned handle so later stages never re-infer it from the DOM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    /// Single-line text-like input (text, tel, email, ...).
    Text,
    /// Multi-line text area.
    TextArea,
    /// Enumerated dropdown.
    Select,
}

/// Handle to one matched control. The handle string is backend-specific
/// (the WebDriver backend stores a re-resolvable locator descriptor so the
/// control survives re-renders between calls).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Control {
    pub handle: String,
    pub kind: ControlKind,
}

/// One option of a select control.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// Notifications the host page's own logic conventionally listens for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageEvent {
    Input,
    Change,
    Blur,
}

impl PageEvent {
    pub fn dom_name(&self) -> &'static str {
        match self {
            PageEvent::Input => "input",
            PageEvent::Change => "change",
            PageEvent::Blur => "blur",
        }
    }
}

/// Primitive operations the engine needs from a live document.
///
/// Implemented by the WebDriver backend for real pages and by an in-memory
/// fake in tests. Every method treats "element vanished since the last call"
/// as an error the caller downgrades to a skipped field; `find` returning
/// `None` is the normal not-found outcome, not an error.
#[async_trait]
pub trait Page: Send + Sync {
    /// Stable identity of the document this page drives; keys the
    /// one-run-per-document guard.
    async fn document_id(&self) -> Result<String>;

    /// First control matching the strategy, with its kind resolved, or
    /// `None` if nothing matches right now.
    async fn find(&self, strategy: &LocatorStrategy) -> Result<Option<Control>>;

    async fn read_value(&self, control: &Control) -> Result<String>;

    /// Write a raw value without firing any notifications.
    async fn write_value(&self, control: &Control, value: &str) -> Result<()>;

    /// Fire one bubbling DOM notification on the control.
    async fn dispatch(&self, control: &Control, event: PageEvent) -> Result<()>;

    async fn options(&self, control: &Control) -> Result<Vec<SelectOption>>;

    /// Select the option with the given option value and fire `change`.
    async fn select_option(&self, control: &Control, value: &str) -> Result<()>;

    /// Cosmetic, bounded highlight of a freshly filled control. Must return
    /// immediately; clearing the highlight is the backend's business.
    async fn highlight(&self, control: &Control, duration: Duration) -> Result<()>;

    async fn scroll_into_view(&self, control: &Control) -> Result<()>;

    /// Disable submit-like controls and annotate them for the human who has
    /// to supply the CAPTCHA/OTP. Returns how many controls were disabled.
    async fn disable_submit_controls(&self, note: &str) -> Result<usize>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory page used by unit tests across the crate.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Clone, Debug)]
    pub struct FakeControl {
        pub name: String,
        pub tag: String,
        pub attrs: HashMap<String, String>,
        /// Raw CSS selectors this control answers to, for `Css` strategies.
        pub css_hooks: Vec<String>,
        pub kind: ControlKind,
        pub value: String,
        pub options: Vec<SelectOption>,
        /// Events fired on this control, in order.
        pub events: Vec<String>,
        /// The control only becomes findable once the page has served this
        /// many `find` calls; simulates async rendering.
        pub appear_after_finds: usize,
    }

    impl FakeControl {
        pub fn text(name: &str) -> Self {
            FakeControl {
                name: name.to_string(),
                tag: "input".to_string(),
                attrs: HashMap::new(),
                css_hooks: Vec::new(),
                kind: ControlKind::Text,
                value: String::new(),
                options: Vec::new(),
                events: Vec::new(),
                appear_after_finds: 0,
            }
        }

        pub fn textarea(name: &str) -> Self {
            FakeControl {
                tag: "textarea".to_string(),
                kind: ControlKind::TextArea,
                ..FakeControl::text(name)
            }
        }

        pub fn select(name: &str, options: &[(&str, &str)]) -> Self {
            FakeControl {
                tag: "select".to_string(),
                kind: ControlKind::Select,
                options: options
                    .iter()
                    .map(|(value, label)| SelectOption {
                        value: value.to_string(),
                        label: label.to_string(),
                    })
                    .collect(),
                ..FakeControl::text(name)
            }
        }

        pub fn with_attr(mut self, attr: &str, value: &str) -> Self {
            self.attrs.insert(attr.to_string(), value.to_string());
            self
        }

        pub fn with_css_hook(mut self, selector: &str) -> Self {
            self.css_hooks.push(selector.to_string());
            self
        }

        pub fn appearing_after(mut self, finds: usize) -> Self {
            self.appear_after_finds = finds;
            self
        }

        fn matches(&self, strategy: &LocatorStrategy) -> bool {
            match strategy {
                LocatorStrategy::AttrContains { tag, attr, value } => {
                    (tag.is_empty() || self.tag == *tag)
                        && self.attrs.get(attr).is_some_and(|v| v.contains(value))
                }
                LocatorStrategy::AttrEquals { tag, attr, value } => {
                    (tag.is_empty() || self.tag == *tag)
                        && self.attrs.get(attr) == Some(value)
                }
                LocatorStrategy::Id(id) => self.attrs.get("id") == Some(id),
                // Positional matching is handled at the page level.
                LocatorStrategy::NthOfKind { .. } => false,
                LocatorStrategy::Css(selector) => self.css_hooks.iter().any(|s| s == selector),
            }
        }
    }

    pub struct FakePage {
        id: String,
        controls: Mutex<Vec<FakeControl>>,
        find_calls: AtomicUsize,
        submit_note: Mutex<Option<String>>,
        submit_count: usize,
    }

    impl FakePage {
        pub fn new(id: &str, controls: Vec<FakeControl>) -> Self {
            FakePage {
                id: id.to_string(),
                controls: Mutex::new(controls),
                find_calls: AtomicUsize::new(0),
                submit_note: Mutex::new(None),
                submit_count: 1,
            }
        }

        pub fn control(&self, name: &str) -> FakeControl {
            self.controls
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.name == name)
                .cloned()
                .unwrap_or_else(|| panic!("no fake control named {name}"))
        }

        pub fn submit_note(&self) -> Option<String> {
            self.submit_note.lock().unwrap().clone()
        }

        fn with_control<R>(
            &self,
            handle: &str,
            f: impl FnOnce(&mut FakeControl) -> R,
        ) -> Result<R> {
            let mut controls = self.controls.lock().unwrap();
            let control = controls
                .iter_mut()
                .find(|c| c.name == handle)
                .ok_or_else(|| anyhow::anyhow!("stale control handle: {handle}"))?;
            Ok(f(control))
        }
    }

    #[async_trait]
    impl Page for FakePage {
        async fn document_id(&self) -> Result<String> {
            Ok(self.id.clone())
        }

        async fn find(&self, strategy: &LocatorStrategy) -> Result<Option<Control>> {
            let served = self.find_calls.fetch_add(1, Ordering::SeqCst);
            let controls = self.controls.lock().unwrap();
            let visible = controls.iter().filter(|c| c.appear_after_finds <= served);
            let hit = if let LocatorStrategy::NthOfKind { tag, index } = strategy {
                visible.filter(|c| c.tag == *tag).nth(*index)
            } else {
                let mut visible = visible;
                visible.find(|c| c.matches(strategy))
            };
            Ok(hit.map(|c| Control {
                handle: c.name.clone(),
                kind: c.kind,
            }))
        }

        async fn read_value(&self, control: &Control) -> Result<String> {
            self.with_control(&control.handle, |c| c.value.clone())
        }

        async fn write_value(&self, control: &Control, value: &str) -> Result<()> {
            self.with_control(&control.handle, |c| c.value = value.to_string())
        }

        async fn dispatch(&self, control: &Control, event: PageEvent) -> Result<()> {
            self.with_control(&control.handle, |c| {
                c.events.push(event.dom_name().to_string())
            })
        }

        async fn options(&self, control: &Control) -> Result<Vec<SelectOption>> {
            self.with_control(&control.handle, |c| c.options.clone())
        }

        async fn select_option(&self, control: &Control, value: &str) -> Result<()> {
            self.with_control(&control.handle, |c| {
                if c.options.iter().any(|o| o.value == value) {
                    c.value = value.to_string();
                    c.events.push("change".to_string());
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("no option with value {value}"))
                }
            })?
        }

        async fn highlight(&self, control: &Control, _duration: Duration) -> Result<()> {
            self.with_control(&control.handle, |c| {
                c.events.push("highlight".to_string())
            })
        }

        async fn scroll_into_view(&self, _control: &Control) -> Result<()> {
            Ok(())
        }

        async fn disable_submit_controls(&self, note: &str) -> Result<usize> {
            *self.submit_note.lock().unwrap() = Some(note.to_string());
            Ok(self.submit_count)
        }
    }
}
