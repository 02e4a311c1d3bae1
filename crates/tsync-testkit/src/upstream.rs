//! Scripted upstream. Serves element collections with the same filter,
//! order and paging contract as the real API, and fails on demand.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tsync_client::{
    parse_timestamp, ApiError, CollectionQuery, Exchange, ResourceFetch, ResourcePage, Upstream,
    API_ROOT,
};
use tsync_client::xml::Element;
use tsync_schemas::Cursor;

#[derive(Default)]
struct State {
    collections: HashMap<String, Vec<Element>>,
    resources: HashMap<String, Element>,
    failures: VecDeque<u16>,
    /// Absolute call number (1-based) -> status.
    scheduled: BTreeMap<usize, u16>,
    calls_made: usize,
    queries: Vec<CollectionQuery>,
    patches: Vec<(i64, String)>,
}

#[derive(Default)]
pub struct FakeUpstream {
    state: Mutex<State>,
}

fn uri(path: &str) -> String {
    format!("https://upstream.test/{API_ROOT}{path}")
}

fn cursor_of(item: &Element, id_field: &str) -> Option<Cursor> {
    let ts = parse_timestamp(item.child_text("LastModifiedDateTime")?)?;
    let id = item.child_text(id_field)?.parse().ok()?;
    Some(Cursor::new(ts, id))
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append items to the collection at `path` (e.g. `events/`).
    pub fn add_items(&self, path: &str, items: impl IntoIterator<Item = Element>) {
        self.state()
            .collections
            .entry(path.to_string())
            .or_default()
            .extend(items);
    }

    /// Replace the collection at `path`.
    pub fn set_items(&self, path: &str, items: Vec<Element>) {
        self.state().collections.insert(path.to_string(), items);
    }

    pub fn set_resource(&self, path: &str, element: Element) {
        self.state().resources.insert(path.to_string(), element);
    }

    /// The next call, of any kind, fails with `status`.
    pub fn fail_next(&self, status: u16) {
        self.state().failures.push_back(status);
    }

    /// The `n`th call from now (1 is the next one) fails with `status`;
    /// the calls before it succeed.
    pub fn fail_call(&self, n: usize, status: u16) {
        let mut s = self.state();
        let at = s.calls_made + n.max(1);
        s.scheduled.insert(at, status);
    }

    pub fn queries(&self) -> Vec<CollectionQuery> {
        self.state().queries.clone()
    }

    pub fn patches(&self) -> Vec<(i64, String)> {
        self.state().patches.clone()
    }

    pub fn call_count(&self) -> usize {
        let s = self.state();
        s.queries.len() + s.patches.len()
    }

    fn scripted_failure(&self, method: &'static str, path: &str) -> Result<(), ApiError> {
        let mut s = self.state();
        s.calls_made += 1;
        let call = s.calls_made;
        let failure = s.failures.pop_front().or_else(|| s.scheduled.remove(&call));
        match failure {
            Some(status) => Err(ApiError::status(method, uri(path), status)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn fetch_page(&self, query: &CollectionQuery) -> Result<ResourcePage, ApiError> {
        self.state().queries.push(query.clone());
        self.scripted_failure("GET", &query.path)?;

        let s = self.state();
        let mut matching: Vec<(Cursor, Element)> = s
            .collections
            .get(&query.path)
            .into_iter()
            .flatten()
            .filter_map(|item| cursor_of(item, query.id_field).map(|c| (c, item.clone())))
            .filter(|(c, _)| *c > query.cursor)
            .collect();
        matching.sort_by_key(|(c, _)| *c);

        let top = query.top as usize;
        let has_more = matching.len() > top;
        let items = matching.into_iter().take(top).map(|(_, e)| e).collect();
        Ok(ResourcePage {
            exchange: Exchange {
                method: "GET",
                uri: uri(&query.path),
                status: 200,
            },
            items,
            has_more,
        })
    }

    async fn fetch_resource(&self, path: &str, _item: &str) -> Result<ResourceFetch, ApiError> {
        self.scripted_failure("GET", path)?;
        match self.state().resources.get(path) {
            Some(element) => Ok(ResourceFetch {
                exchange: Exchange {
                    method: "GET",
                    uri: uri(path),
                    status: 200,
                },
                element: element.clone(),
            }),
            None => Err(ApiError::status("GET", uri(path), 404)),
        }
    }

    async fn patch_registration(
        &self,
        registration_id: i64,
        diff_xml: &str,
    ) -> Result<Exchange, ApiError> {
        let path = format!("registrations/{registration_id}/");
        self.scripted_failure("PATCH", &path)?;
        self.state()
            .patches
            .push((registration_id, diff_xml.to_string()));
        Ok(Exchange {
            method: "PATCH",
            uri: uri(&path),
            status: 200,
        })
    }
}
