use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::Utc;
use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::{
    cache::CacheStore,
    config::SyncConfig,
    directory::EndpointDirectory,
    events::SyncEvent,
    fetch::{FetchDescriptor, FetchDispatcher, Transport},
    friends::{parse_friend_list_message, FriendRegistry},
    profiles::{
        decode_item_guesses, decode_item_list, decode_online_players, decode_player_stats,
        decode_territory_list, ItemCatalog, ItemGuessProfile, PlayerStatsProfile,
        TerritoryProfile,
    },
    worker::PollingWorker,
};

const DIRECTORY_CACHE_KEY: &str = "webapi.txt";
const TERRITORY_CACHE_KEY: &str = "territories.json";
const ITEM_LIST_CACHE_KEY: &str = "item_list.json";
const ITEM_GUESSES_CACHE_KEY: &str = "item_guesses.json";

/// Which workers an invocation of [`SyncCore::start_workers`] actually
/// started. Already-running workers are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatus {
    pub territory_started: bool,
    pub friend_started: bool,
}

#[derive(Default)]
struct WorkerSlots {
    territory: Option<PollingWorker>,
    friend: Option<PollingWorker>,
}

/// Owner of every shared container in the synchronization layer: the endpoint
/// directory snapshot, the territory map, the item catalog and guesses, and
/// the friend registry. Workers and ad-hoc triggers all go through one
/// instance of this type; containers are replaced wholesale (arc-swap) or
/// guarded by the registry's single lock, so readers never see a partial
/// update.
pub struct SyncCore {
    me: Weak<SyncCore>,
    config: SyncConfig,
    cache: Arc<CacheStore>,
    dispatcher: Arc<FetchDispatcher>,
    directory: ArcSwapOption<EndpointDirectory>,
    territories: ArcSwap<HashMap<String, TerritoryProfile>>,
    item_catalog: ArcSwapOption<ItemCatalog>,
    item_guesses: ArcSwapOption<HashMap<String, ItemGuessProfile>>,
    friends: FriendRegistry,
    current_splash: Mutex<String>,
    setup: AtomicBool,
    events: Sender<SyncEvent>,
    workers: Mutex<WorkerSlots>,
}

impl SyncCore {
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        events: Sender<SyncEvent>,
    ) -> Arc<Self> {
        let cache = Arc::new(CacheStore::new(config.resolved_cache_root()));
        let dispatcher = Arc::new(FetchDispatcher::new(transport, Arc::clone(&cache)));
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            cache,
            dispatcher,
            directory: ArcSwapOption::empty(),
            territories: ArcSwap::from_pointee(HashMap::new()),
            item_catalog: ArcSwapOption::empty(),
            item_guesses: ArcSwapOption::empty(),
            friends: FriendRegistry::default(),
            current_splash: Mutex::new(String::new()),
            setup: AtomicBool::new(false),
            events,
            workers: Mutex::new(WorkerSlots::default()),
        })
    }

    fn handle(&self) -> Arc<Self> {
        self.me
            .upgrade()
            .expect("synchronization core dropped while in use")
    }

    /// Cold start: resolve the directory, pick a splash, load the common
    /// catalogs, start both polling workers.
    pub async fn init(&self) {
        self.resolve_directory(false).await;
        self.update_current_splash();
        self.load_common_objects().await;
        self.start_workers();
    }

    /// Drops every shared container back to its cold-start state and stops
    /// the workers. A later `init` repopulates from scratch.
    pub fn reset(&self) {
        self.stop_workers();
        self.directory.store(None);
        self.dispatcher.set_api_key(None);
        self.territories.store(Arc::new(HashMap::new()));
        self.item_catalog.store(None);
        self.item_guesses.store(None);
        self.friends.clear();
        self.current_splash
            .lock()
            .expect("splash lock poisoned")
            .clear();
        info!("synchronization core reset");
    }

    pub fn shutdown(&self) {
        self.stop_workers();
        info!("synchronization core shut down");
    }

    /// The "reload requested" collaborator signal: force a live directory
    /// refresh and reload the catalogs.
    pub async fn reload(&self) {
        self.resolve_directory(true).await;
        self.update_current_splash();
        self.load_common_objects().await;
    }

    /// Resolves the endpoint directory. Without `force_network`, a readable
    /// cached copy is swapped in as an interim value before the live fetch;
    /// a failed live fetch keeps whatever was installed last. With nothing
    /// installed and nothing cached the directory stays unresolved and every
    /// dependent lookup reports unavailable.
    pub async fn resolve_directory(&self, force_network: bool) {
        if !force_network && self.directory.load().is_none() {
            if let Some(bytes) = self.cache.read(DIRECTORY_CACHE_KEY) {
                match EndpointDirectory::decode(&bytes) {
                    Ok(directory) => {
                        debug!("installing cached endpoint directory while refreshing");
                        self.install_directory(directory);
                    }
                    Err(err) => {
                        warn!(?err, "cached endpoint directory is unreadable; ignoring")
                    }
                }
            }
        }
        let descriptor = FetchDescriptor::new(
            "webapi",
            self.config.bootstrap_url.clone(),
            DIRECTORY_CACHE_KEY,
            EndpointDirectory::decode,
        )
        .use_cache_as_backup();
        match self.dispatcher.dispatch(descriptor).await {
            Ok(fetched) => self.install_directory(fetched.value),
            Err(err) => {
                warn!(?err, "endpoint directory is unavailable; dependent lookups stay gated")
            }
        }
    }

    fn install_directory(&self, directory: EndpointDirectory) {
        self.dispatcher
            .set_api_key(directory.api_key().map(ToOwned::to_owned));
        self.directory.store(Some(Arc::new(directory)));
        self.setup.store(true, Ordering::SeqCst);
        self.emit(SyncEvent::DirectoryResolved { at: Utc::now() });
    }

    async fn load_common_objects(&self) {
        self.queue_item_list();
        self.queue_item_guesses();
        self.dispatcher.run_queued().await;
    }

    /// One territory refresh: fetch the list and replace the whole map. A
    /// missing directory entry is a quiet no-op; a failed fetch leaves the
    /// previous map in place.
    pub async fn load_territories(&self) -> anyhow::Result<()> {
        let Some(base) = self.api_url("Athena") else {
            return Ok(());
        };
        let descriptor = FetchDescriptor::new(
            "territory",
            format!("{base}/cache/get/territoryList"),
            TERRITORY_CACHE_KEY,
            decode_territory_list,
        );
        let fetched = self.dispatcher.dispatch(descriptor).await?;
        self.territories.store(Arc::new(fetched.value));
        self.emit(SyncEvent::TerritoryListUpdated { at: Utc::now() });
        Ok(())
    }

    /// One friend refresh: replenish the queue from online friends, pop one
    /// username and fetch its stats. An empty queue or a missing directory
    /// entry is a no-op success; a failed fetch re-enqueues the username at
    /// the tail.
    pub async fn load_friend_tick(&self) -> anyhow::Result<()> {
        let Some(base) = self.api_url("PlayerStatsv2") else {
            return Ok(());
        };
        let Some(username) = self.friends.poll_next() else {
            return Ok(());
        };
        let descriptor = FetchDescriptor::new(
            format!("friend-{username}"),
            format!("{base}{username}/stats"),
            format!("friends/{username}.json"),
            decode_player_stats,
        );
        match self.dispatcher.dispatch(descriptor).await {
            Ok(fetched) => {
                info!(username = %fetched.value.username, "updated friend stats");
                self.friends.apply_stats(fetched.value);
                self.emit(SyncEvent::FriendStatsUpdated { at: Utc::now() });
                Ok(())
            }
            Err(err) => {
                self.friends.requeue(username.clone());
                Err(anyhow::Error::from(err).context(format!("refreshing friend {username}")))
            }
        }
    }

    fn queue_item_list(&self) {
        let Some(base) = self.api_url("Athena") else {
            return;
        };
        let descriptor = FetchDescriptor::new(
            "item_list",
            format!("{base}/cache/get/itemList"),
            ITEM_LIST_CACHE_KEY,
            decode_item_list,
        )
        .use_cache_as_backup();
        let core = self.handle();
        Arc::clone(&self.dispatcher).enqueue(descriptor, move |result| match result {
            Ok(fetched) => {
                core.item_catalog.store(Some(Arc::new(fetched.value)));
                core.emit(SyncEvent::ItemCatalogLoaded { at: Utc::now() });
            }
            Err(err) => warn!(?err, "item catalog is unavailable"),
        });
    }

    fn queue_item_guesses(&self) {
        let Some(url) = self.api_url("ItemGuesses") else {
            return;
        };
        let descriptor = FetchDescriptor::new(
            "item_guesses",
            url,
            ITEM_GUESSES_CACHE_KEY,
            decode_item_guesses,
        )
        .use_cache_as_backup();
        let core = self.handle();
        Arc::clone(&self.dispatcher).enqueue(descriptor, move |result| match result {
            Ok(fetched) => {
                core.item_guesses.store(Some(Arc::new(fetched.value)));
                core.emit(SyncEvent::ItemGuessesLoaded { at: Utc::now() });
            }
            Err(err) => warn!(?err, "item guesses are unavailable"),
        });
    }

    /// Uncached lookup of everyone currently online, keyed by server.
    pub async fn online_players(&self) -> anyhow::Result<HashMap<String, Vec<String>>> {
        let Some(url) = self.api_url("OnlinePlayers") else {
            return Ok(HashMap::new());
        };
        let bytes = self.dispatcher.fetch_uncached(&url).await?;
        Ok(decode_online_players(&bytes)?)
    }

    pub fn start_workers(&self) -> WorkerStatus {
        let mut slots = self.workers.lock().expect("worker slots lock poisoned");
        let mut status = WorkerStatus::default();
        if !slot_running(&slots.territory) {
            let core = self.handle();
            slots.territory = Some(PollingWorker::spawn(
                "territory",
                Duration::ZERO,
                self.config.territory_interval(),
                move || {
                    let core = Arc::clone(&core);
                    async move { core.load_territories().await }
                },
            ));
            status.territory_started = true;
        }
        if !slot_running(&slots.friend) {
            let core = self.handle();
            slots.friend = Some(PollingWorker::spawn_with_cleanup(
                "friend",
                self.config.friend_start_delay(),
                self.config.friend_interval(),
                move || {
                    let core = Arc::clone(&core);
                    async move { core.load_friend_tick().await }
                },
                || info!("friend update worker detached from chat intake"),
            ));
            status.friend_started = true;
        }
        status
    }

    pub fn stop_workers(&self) {
        let mut slots = self.workers.lock().expect("worker slots lock poisoned");
        if let Some(worker) = slots.territory.take() {
            worker.stop();
        }
        if let Some(worker) = slots.friend.take() {
            worker.stop();
        }
    }

    pub fn workers_running(&self) -> (bool, bool) {
        let slots = self.workers.lock().expect("worker slots lock poisoned");
        (slot_running(&slots.territory), slot_running(&slots.friend))
    }

    /// Chat-derived friend discovery; every parsed name joins the poll queue.
    pub fn handle_chat_message(&self, message: &str) {
        for name in parse_friend_list_message(message) {
            info!(friend = %name, "queueing friend discovered in chat");
            self.friends.add_friend(&name);
        }
    }

    pub fn add_friend(&self, name: &str) {
        self.friends.add_friend(name);
    }

    pub fn update_current_splash(&self) {
        let Some(directory) = self.directory.load_full() else {
            return;
        };
        let Some(splash) = directory.pick_splash() else {
            return;
        };
        *self.current_splash.lock().expect("splash lock poisoned") = splash;
    }

    pub fn api_url(&self, key: &str) -> Option<String> {
        self.directory
            .load()
            .as_ref()
            .and_then(|directory| directory.get(key).map(ToOwned::to_owned))
    }

    pub fn directory(&self) -> Option<Arc<EndpointDirectory>> {
        self.directory.load_full()
    }

    pub fn territories(&self) -> Arc<HashMap<String, TerritoryProfile>> {
        self.territories.load_full()
    }

    pub fn is_territory_list_loaded(&self) -> bool {
        !self.territories.load().is_empty()
    }

    pub fn item_catalog(&self) -> Option<Arc<ItemCatalog>> {
        self.item_catalog.load_full()
    }

    pub fn item_guesses(&self) -> Option<Arc<HashMap<String, ItemGuessProfile>>> {
        self.item_guesses.load_full()
    }

    pub fn friends(&self) -> &FriendRegistry {
        &self.friends
    }

    pub fn friend_stats(&self) -> Vec<PlayerStatsProfile> {
        self.friends.friend_stats()
    }

    pub fn is_setup(&self) -> bool {
        self.setup.load(Ordering::SeqCst)
    }

    pub fn current_splash(&self) -> String {
        self.current_splash
            .lock()
            .expect("splash lock poisoned")
            .clone()
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }
}

fn slot_running(slot: &Option<PollingWorker>) -> bool {
    slot.as_ref()
        .map(|worker| !worker.is_finished())
        .unwrap_or(false)
}
