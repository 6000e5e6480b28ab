//! The coordinator's own event callbacks: `on_connected`, `on_empty`,
//! `on_error`, `on_connection_change`.
//!
//! Boxed `Fn` trait objects behind a builder-style struct, the inverse of
//! a `MessageHandler`-style trait-object pattern (one struct of optional
//! callbacks instead of one trait with several methods), since the
//! coordinator's caller usually only wants one or two of the four events.

type Callback = Box<dyn Fn() + Send + Sync>;
type ErrorCallback = Box<dyn Fn(String) + Send + Sync>;
type ConnectionChangeCallback = Box<dyn Fn(Option<u64>) + Send + Sync>;

#[derive(Default)]
pub struct CoordinatorEvents {
	on_connected: Option<Callback>,
	on_empty: Option<Callback>,
	on_error: Option<ErrorCallback>,
	on_connection_change: Option<ConnectionChangeCallback>,
}

impl CoordinatorEvents {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
		self.on_connected = Some(Box::new(f));
		self
	}

	pub fn on_empty(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
		self.on_empty = Some(Box::new(f));
		self
	}

	pub fn on_error(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
		self.on_error = Some(Box::new(f));
		self
	}

	pub fn on_connection_change(mut self, f: impl Fn(Option<u64>) + Send + Sync + 'static) -> Self {
		self.on_connection_change = Some(Box::new(f));
		self
	}

	pub(crate) fn fire_connected(&self) {
		if let Some(f) = &self.on_connected {
			f();
		}
	}

	pub(crate) fn fire_empty(&self) {
		if let Some(f) = &self.on_empty {
			f();
		}
	}

	pub(crate) fn fire_error(&self, message: String) {
		if let Some(f) = &self.on_error {
			f(message);
		}
	}

	pub(crate) fn fire_connection_change(&self, at: Option<u64>) {
		if let Some(f) = &self.on_connection_change {
			f(at);
		}
	}
}
