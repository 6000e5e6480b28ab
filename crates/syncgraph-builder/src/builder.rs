//! The graph reconstructor.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use syncgraph_model::{Field, Identity, Instance, InstanceKey, InstancePayload, ModelMap, Operation};

use crate::error::{BuilderError, Result};

/// The derived view returned by [`Builder::state`], matching the
/// single-anchor / multi-anchor split.
#[derive(Debug, Clone)]
pub enum State {
	Single(Option<Arc<Instance>>),
	Many(Vec<Arc<Instance>>),
}

impl State {
	pub fn as_single(&self) -> Option<&Arc<Instance>> {
		match self {
			State::Single(inst) => inst.as_ref(),
			State::Many(_) => None,
		}
	}

	pub fn as_many(&self) -> Option<&[Arc<Instance>]> {
		match self {
			State::Many(list) => Some(list.as_slice()),
			State::Single(_) => None,
		}
	}
}

type Referrer = (InstanceKey, String);

/// Owns the instance index and the reverse-reference map; converts flat
/// payloads into a live nested graph and performs upward invalidation on
/// every change.
#[derive(Debug)]
pub struct Builder {
	model_map: ModelMap,
	anchor_type: String,
	many: bool,
	index: FxHashMap<InstanceKey, Arc<Instance>>,
	reverse: FxHashMap<InstanceKey, FxHashSet<Referrer>>,
	anchor_single: Option<InstanceKey>,
	anchor_seq: Vec<InstanceKey>,
	/// First non-anchor-type payload's type tag observed in multi-anchor
	/// mode. Anchor-sequence maintenance itself only ever fires for
	/// payloads whose type equals `anchor_type`, so this is retained for
	/// diagnostics rather than branching on.
	root_type: Option<String>,
}

impl Builder {
	pub fn new(model_map: ModelMap, anchor_type: impl Into<String>, many: bool) -> Self {
		Self {
			model_map,
			anchor_type: anchor_type.into(),
			many,
			index: FxHashMap::default(),
			reverse: FxHashMap::default(),
			anchor_single: None,
			anchor_seq: Vec::new(),
			root_type: None,
		}
	}

	pub fn anchor_type(&self) -> &str {
		&self.anchor_type
	}

	pub fn root_type(&self) -> Option<&str> {
		self.root_type.as_deref()
	}

	pub fn len(&self) -> usize {
		self.index.len()
	}

	pub fn is_empty(&self) -> bool {
		self.index.is_empty()
	}

	/// Multi-anchor initialization. Replaces the anchor sequence with the
	/// given ordered ids, filtering duplicates, and creates a placeholder
	/// for each id not yet in the index.
	pub fn set_anchors<I: IntoIterator<Item = i64>>(&mut self, ids: I) {
		let mut seen = FxHashSet::default();
		let mut seq = Vec::new();
		for id in ids {
			let key = InstanceKey::new(&self.anchor_type, id);
			if seen.insert(key.clone()) {
				self.ensure_placeholder(&key, &self.anchor_type.clone(), id);
				seq.push(key);
			}
		}
		self.anchor_seq = seq;
	}

	/// Insert at head if not already present.
	pub fn prepend_anchor(&mut self, id: i64) {
		let key = InstanceKey::new(&self.anchor_type, id);
		if self.anchor_seq.contains(&key) {
			return;
		}
		self.ensure_placeholder(&key, &self.anchor_type.clone(), id);
		self.anchor_seq.insert(0, key);
	}

	/// Consumes an ordered batch of payloads, applying each in arrival
	/// order.
	pub fn update<I: IntoIterator<Item = InstancePayload>>(&mut self, batch: I) -> Result<()> {
		for payload in batch {
			self.ingest(payload)?;
		}
		Ok(())
	}

	/// Derived view: in single mode, a fresh shallow copy of the anchor's
	/// indexed instance; in multi mode, an ordered sequence of fresh
	/// shallow copies keyed by the current anchor sequence. Each call
	/// returns new top-level references.
	pub fn state(&self) -> State {
		if self.many {
			State::Many(
				self.anchor_seq
					.iter()
					.filter_map(|key| self.fresh_copy(key))
					.collect(),
			)
		} else {
			State::Single(self.anchor_single.as_ref().and_then(|key| self.fresh_copy(key)))
		}
	}

	pub fn get_instance(&self, key: &InstanceKey) -> Result<Arc<Instance>> {
		self.index
			.get(key)
			.cloned()
			.ok_or_else(|| BuilderError::InstanceNotFound(key.clone()))
	}

	pub fn get_instance_opt(&self, key: &InstanceKey) -> Option<Arc<Instance>> {
		self.index.get(key).cloned()
	}

	fn fresh_copy(&self, key: &InstanceKey) -> Option<Arc<Instance>> {
		self.index.get(key).map(|inst| Arc::new((**inst).clone()))
	}

	fn ensure_placeholder(&mut self, key: &InstanceKey, type_tag: &str, id: i64) {
		if !self.index.contains_key(key) {
			self.index
				.insert(key.clone(), Arc::new(Instance::placeholder(Identity::new(type_tag, id))));
			self.reverse.entry(key.clone()).or_default();
		}
	}

	/// Ingest one payload: latch anchor-sequence bookkeeping, resolve the
	/// deletion path, merge scalar and relational fields into the index,
	/// and invalidate every ancestor of whatever changed.
	fn ingest(&mut self, p: InstancePayload) -> Result<()> {
		// Step 1: anchor-sequence maintenance (multi-anchor mode only).
		if self.many {
			if p.instance_type == self.anchor_type {
				match p.operation {
					Operation::InitialState => {
						let key = InstanceKey::new(&self.anchor_type, p.id);
						if !self.anchor_seq.contains(&key) {
							self.ensure_placeholder(&key, &self.anchor_type.clone(), p.id);
							self.anchor_seq.push(key);
						}
					}
					Operation::Delete => {
						let key = InstanceKey::new(&self.anchor_type, p.id);
						self.anchor_seq.retain(|k| k != &key);
						// falls through to the deletion path below
					}
					_ => {}
				}
			} else if self.root_type.is_none() {
				self.root_type = Some(p.instance_type.clone());
			}
		}

		// Step 2: single-anchor initialization.
		if !self.many && self.anchor_single.is_none() {
			if p.instance_type != self.anchor_type {
				return Err(BuilderError::AnchorTypeMismatch {
					expected: self.anchor_type.clone(),
					actual: p.instance_type,
				});
			}
			self.anchor_single = Some(InstanceKey::new(&self.anchor_type, p.id));
		}

		// Step 3: deletion path.
		if p.operation == Operation::Delete {
			self.delete(Identity::new(p.instance_type, p.id));
			return Ok(());
		}

		// Step 4 + 5: merge into index, resolving relational fields.
		let k = InstanceKey::new(&p.instance_type, p.id);
		let mut fields = std::collections::HashMap::with_capacity(p.fields.len());
		for (name, value) in p.fields.iter() {
			if let Some(target_type) = self.model_map.relation_target(&p.instance_type, name) {
				let target_type = target_type.to_string();
				match value {
					serde_json::Value::Array(items) => {
						let mut list = Vec::with_capacity(items.len());
						for item in items {
							if let Some(id) = item.as_i64() {
								list.push(self.get_or_create(&target_type, id, &k, name));
							}
						}
						fields.insert(name.clone(), Field::RefList(list));
					}
					serde_json::Value::Null => {
						fields.insert(name.clone(), Field::Ref(None));
					}
					other => match other.as_i64() {
						Some(id) => {
							fields.insert(name.clone(), Field::Ref(Some(self.get_or_create(&target_type, id, &k, name))));
						}
						None => {
							tracing::warn!(
								type_tag = %p.instance_type,
								property = %name,
								"relational field value is neither an id, a list of ids, nor null; storing verbatim"
							);
							fields.insert(name.clone(), Field::Scalar(other.clone()));
						}
					},
				}
			} else {
				fields.insert(name.clone(), Field::Scalar(value.clone()));
			}
		}

		let new_obj = Instance {
			identity: Identity::new(p.instance_type, p.id),
			tstamp: p.tstamp,
			operation: p.operation,
			loaded: true,
			fields,
		};

		// Step 6: invalidate upward.
		let had_inbound = self.reverse.get(&k).is_some_and(|refs| !refs.is_empty());
		self.index.insert(k.clone(), Arc::new(new_obj));
		if had_inbound {
			let mut visited = FxHashSet::default();
			self.invalidate(&k, &mut visited);
		} else {
			self.reverse.entry(k).or_default();
		}

		Ok(())
	}

	/// Never calls `invalidate` here: the referrer is being freshly
	/// rewritten by the caller and will be installed into the index right
	/// after this returns.
	fn get_or_create(&mut self, target_type: &str, id: i64, referrer_key: &InstanceKey, property: &str) -> Arc<Instance> {
		let tk = InstanceKey::new(target_type, id);
		self.ensure_placeholder(&tk, target_type, id);
		self.reverse
			.entry(tk.clone())
			.or_default()
			.insert((referrer_key.clone(), property.to_string()));
		Arc::clone(self.index.get(&tk).expect("just ensured present"))
	}

	/// Replaces every ancestor on every path to the anchor with a fresh
	/// copy, so a reference-equality check detects the change all the way
	/// up the graph.
	fn invalidate(&mut self, key: &InstanceKey, visited: &mut FxHashSet<InstanceKey>) {
		if !visited.insert(key.clone()) {
			return;
		}
		let Some(referrers) = self.reverse.get(key).cloned() else {
			return;
		};
		for (referrer_key, property) in referrers {
			let Some(referrer) = self.index.get(&referrer_key).cloned() else {
				continue;
			};
			let mut updated = (*referrer).clone();
			match referrer.fields.get(&property) {
				Some(Field::RefList(list)) => {
					let rebuilt: Vec<Arc<Instance>> = list
						.iter()
						.map(|elem| self.index.get(&elem.key()).cloned().unwrap_or_else(|| elem.clone()))
						.collect();
					updated.fields.insert(property.clone(), Field::RefList(rebuilt));
				}
				Some(Field::Ref(_)) => {
					if let Some(fresh) = self.index.get(key).cloned() {
						updated.fields.insert(property.clone(), Field::Ref(Some(fresh)));
					}
				}
				_ => {}
			}
			self.index.insert(referrer_key.clone(), Arc::new(updated));
			self.invalidate(&referrer_key, visited);
		}
	}

	/// After mutating each referrer's property in place, calls `invalidate`
	/// on that referrer so freshness propagates all the way to the anchor
	/// for deletes as well as creates and updates (see DESIGN.md for why
	/// this strengthens the source behavior of mutating in place only).
	fn delete(&mut self, identity: Identity) {
		let key = identity.key();
		if self.many && identity.type_tag == self.anchor_type {
			self.anchor_seq.retain(|k| k != &key);
		}

		let referrers = self.reverse.remove(&key).unwrap_or_default();
		for (referrer_key, property) in referrers.iter() {
			let Some(referrer) = self.index.get(referrer_key).cloned() else {
				continue;
			};
			let mut updated = (*referrer).clone();
			match referrer.fields.get(property) {
				Some(Field::RefList(list)) => {
					let filtered: Vec<Arc<Instance>> = list.iter().filter(|e| e.identity != identity).cloned().collect();
					updated.fields.insert(property.clone(), Field::RefList(filtered));
				}
				Some(Field::Ref(_)) => {
					updated.fields.insert(property.clone(), Field::Ref(None));
				}
				_ => {}
			}
			self.index.insert(referrer_key.clone(), Arc::new(updated));
		}
		self.index.remove(&key);

		let mut visited = FxHashSet::default();
		for (referrer_key, _) in referrers {
			self.invalidate(&referrer_key, &mut visited);
		}
	}
}
