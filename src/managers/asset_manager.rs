use futures::stream::{self, StreamExt};
use image::RgbaImage;
use parking_lot::RwLock;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::compose::{decode_image, resize_to_height, OverlayAssets, RawOverlays};
use crate::config::{BotConfig, BracketLayout, DriveFolders};
use crate::error::{BotError, Result};
use crate::models::{Gender, GenderFilter, IdolChoice};
use crate::services::{ImageSource, ObjectStore, RemoteFile, SharedImageSource, SharedObjectStore};

pub const VERSES_FILE: &str = "verses.png";
pub const SHADOW_BORDER_FILE: &str = "shadow-border.png";
pub const BRACKET_FILE: &str = "topEightBracket.png";
pub const CROWN_FILE: &str = "crown.png";

/// Every selectable idol, keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct Roster {
    idols: Vec<Arc<IdolChoice>>,
    index: HashMap<String, usize>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an idol, or append its images as variants if the identifier is known.
    /// Returns true when a new entry was created.
    pub fn insert(&mut self, idol: IdolChoice) -> bool {
        match self.index.get(&idol.id) {
            Some(&i) => {
                Arc::make_mut(&mut self.idols[i]).images.extend(idol.images);
                false
            }
            None => {
                self.index.insert(idol.id.clone(), self.idols.len());
                self.idols.push(Arc::new(idol));
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.idols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idols.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<IdolChoice>> {
        self.index.get(id).map(|&i| &self.idols[i])
    }

    pub fn filtered(&self, filter: GenderFilter) -> Vec<Arc<IdolChoice>> {
        self.idols
            .iter()
            .filter(|i| filter.includes(i.gender))
            .cloned()
            .collect()
    }

    pub fn count(&self, filter: GenderFilter) -> usize {
        self.idols.iter().filter(|i| filter.includes(i.gender)).count()
    }

    /// group name -> sorted idol names, for one gender
    pub fn groups(&self, gender: Gender) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for idol in self.idols.iter().filter(|i| i.gender == gender) {
            groups
                .entry(idol.group_name.clone())
                .or_default()
                .push(idol.idol_name.clone());
        }
        for names in groups.values_mut() {
            names.sort();
        }
        groups
    }
}

/// Outcome of a full roster refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub idols: usize,
    pub skipped: usize,
}

/// Owns the idol roster and the overlay bundle
pub struct AssetManager {
    roster: RwLock<Arc<Roster>>,
    overlays: Arc<OverlayAssets>,
    store: SharedObjectStore,
    images: SharedImageSource,
    folders: DriveFolders,
    image_height: u32,
    fetch_concurrency: usize,
    fetch_timeout: Duration,
    /// Serializes refreshes and single additions
    update_lock: Mutex<()>,
}

impl AssetManager {
    pub fn new(
        config: &BotConfig,
        store: SharedObjectStore,
        images: SharedImageSource,
        overlays: Arc<OverlayAssets>,
    ) -> Self {
        Self {
            roster: RwLock::new(Arc::new(Roster::new())),
            overlays,
            store,
            images,
            folders: config.folders.clone(),
            image_height: config.image_height,
            fetch_concurrency: config.fetch_concurrency.max(1),
            fetch_timeout: config.fetch_timeout(),
            update_lock: Mutex::new(()),
        }
    }

    /// Current roster snapshot
    pub fn roster(&self) -> Arc<Roster> {
        self.roster.read().clone()
    }

    pub fn overlays(&self) -> Arc<OverlayAssets> {
        self.overlays.clone()
    }

    pub fn object_store(&self) -> &SharedObjectStore {
        &self.store
    }

    pub fn image_source(&self) -> &SharedImageSource {
        &self.images
    }

    pub fn folder_for(&self, gender: Gender) -> &str {
        match gender {
            Gender::Girl => &self.folders.girls,
            Gender::Boy => &self.folders.boys,
        }
    }

    /// Rebuild the roster from the remote folders.
    ///
    /// The new roster is built aside and swapped in at the end. Files that
    /// fail to fetch or decode are skipped.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let _guard = self.update_lock.lock().await;

        let girls = self.store.list_files(&self.folders.girls).await?;
        let boys = self.store.list_files(&self.folders.boys).await?;

        let files: Vec<(RemoteFile, Gender)> = girls
            .into_iter()
            .map(|f| (f, Gender::Girl))
            .chain(boys.into_iter().map(|f| (f, Gender::Boy)))
            .filter(|(f, _)| f.is_image())
            .collect();

        if files.is_empty() {
            warn!("No idol images found, keeping the current roster");
            return Ok(RefreshReport {
                idols: self.roster().len(),
                skipped: 0,
            });
        }

        info!("Loading {} idol images", files.len());

        let results: Vec<(String, Result<IdolChoice>)> = stream::iter(files)
            .map(|(file, gender)| async move {
                let name = file.name.clone();
                (name, self.load_idol(&file, gender).await)
            })
            .buffer_unordered(self.fetch_concurrency)
            .collect()
            .await;

        let mut roster = Roster::new();
        let mut skipped = 0;
        for (name, result) in results {
            match result {
                Ok(idol) => {
                    roster.insert(idol);
                }
                Err(e) => {
                    warn!("Skipping idol image '{}': {}", name, e);
                    skipped += 1;
                }
            }
        }

        let report = RefreshReport {
            idols: roster.len(),
            skipped,
        };
        *self.roster.write() = Arc::new(roster);

        info!(
            "Amount of idols loaded: {} ({} files skipped)",
            report.idols, report.skipped
        );
        Ok(report)
    }

    /// Merge one newly uploaded file into the roster without a full refresh
    pub async fn add_single(&self, file: &RemoteFile, gender: Gender) -> Result<()> {
        let idol = self.load_idol(file, gender).await?;
        let _guard = self.update_lock.lock().await;

        let mut roster = Roster::clone(&self.roster());
        let created = roster.insert(idol);
        *self.roster.write() = Arc::new(roster);

        debug!(
            "Added '{}' to the roster ({})",
            file.name,
            if created { "new idol" } else { "new variant" }
        );
        Ok(())
    }

    /// `count` distinct random idols matching `filter`
    pub fn pick_contestants(
        &self,
        filter: GenderFilter,
        count: usize,
    ) -> Result<Vec<Arc<IdolChoice>>> {
        let candidates = self.roster().filtered(filter);
        if candidates.len() < count {
            return Err(BotError::InsufficientRoster {
                requested: count,
                available: candidates.len(),
            });
        }

        let mut rng = rand::rng();
        let mut picked: Vec<Arc<IdolChoice>> = candidates
            .choose_multiple(&mut rng, count)
            .cloned()
            .collect();
        picked.shuffle(&mut rng);
        Ok(picked)
    }

    /// Image variant of `idol` for one game.
    ///
    /// The first call picks a random variant and records it in `memo`; later
    /// calls return the same one. A recorded index that no longer exists
    /// (the roster was refreshed with fewer images) is re-picked.
    pub fn variant_for(
        &self,
        idol: &Arc<IdolChoice>,
        memo: &mut HashMap<String, usize>,
    ) -> Result<Arc<RgbaImage>> {
        let roster = self.roster();
        let current = roster.get(&idol.id).unwrap_or(idol);
        let images = &current.images;

        if let Some(img) = memo.get(&idol.id).and_then(|&i| images.get(i)) {
            return Ok(img.clone());
        }

        if images.is_empty() {
            return Err(BotError::Internal {
                message: format!("idol '{}' has no images", idol.id),
            });
        }

        let index = rand::rng().random_range(0..images.len());
        memo.insert(idol.id.clone(), index);
        Ok(images[index].clone())
    }

    async fn load_idol(&self, file: &RemoteFile, gender: Gender) -> Result<IdolChoice> {
        let height = self.image_height;
        let img = fetch_image(self.images.as_ref(), file, self.fetch_timeout, move |img| {
            resize_to_height(&img, height)
        })
        .await?;

        IdolChoice::from_file(&file.name, &file.id, gender, img).ok_or_else(|| {
            BotError::Internal {
                message: format!("'{}' is not named Group_Idol", file.name),
            }
        })
    }
}

/// Fetch and decode one file, then run `transform` on the blocking pool
async fn fetch_image<F>(
    images: &dyn ImageSource,
    file: &RemoteFile,
    timeout: Duration,
    transform: F,
) -> Result<RgbaImage>
where
    F: FnOnce(RgbaImage) -> RgbaImage + Send + 'static,
{
    let fetched = tokio::time::timeout(timeout, images.fetch(&file.content_link))
        .await
        .map_err(|_| BotError::TransientFetch {
            url: file.content_link.clone(),
            message: format!("timed out after {:?}", timeout),
        })??;

    tokio::task::spawn_blocking(move || decode_image(&fetched.bytes).map(transform)).await?
}

/// Load the decorative overlays from the misc folder.
///
/// Every overlay is required; a missing one is an error.
pub async fn load_overlays(
    store: &dyn ObjectStore,
    images: &dyn ImageSource,
    folder: &str,
    layout: BracketLayout,
    image_height: u32,
    timeout: Duration,
) -> Result<OverlayAssets> {
    let files = store.list_files(folder).await?;
    let find = |name: &str| {
        files
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| BotError::MissingAsset {
                name: name.to_string(),
            })
    };

    let (verses, shadow_border, bracket, crown) = (
        find(VERSES_FILE)?,
        find(SHADOW_BORDER_FILE)?,
        find(BRACKET_FILE)?,
        find(CROWN_FILE)?,
    );

    let (verses, shadow_border, bracket, crown) = futures::try_join!(
        fetch_image(images, verses, timeout, |img| img),
        fetch_image(images, shadow_border, timeout, |img| img),
        fetch_image(images, bracket, timeout, |img| img),
        fetch_image(images, crown, timeout, |img| img),
    )?;

    let raw = RawOverlays {
        verses,
        shadow_border,
        bracket,
        crown,
    };

    info!("Loaded overlay images (bracket layout v{})", layout.version);
    Ok(tokio::task::spawn_blocking(move || OverlayAssets::prepare(raw, layout, image_height)).await?)
}

/// Shared asset manager type
pub type SharedAssetManager = Arc<AssetManager>;

pub fn create_shared_asset_manager(
    config: &BotConfig,
    store: SharedObjectStore,
    images: SharedImageSource,
    overlays: Arc<OverlayAssets>,
) -> SharedAssetManager {
    Arc::new(AssetManager::new(config, store, images, overlays))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, test_overlays, MemoryDrive};
    use std::sync::atomic::Ordering;

    fn config() -> BotConfig {
        BotConfig {
            folders: DriveFolders {
                girls: "girls".to_string(),
                boys: "boys".to_string(),
                misc: "misc".to_string(),
            },
            image_height: 8,
            fetch_concurrency: 4,
            ..BotConfig::default()
        }
    }

    fn manager(drive: Arc<MemoryDrive>) -> AssetManager {
        AssetManager::new(&config(), drive.clone(), drive, Arc::new(test_overlays()))
    }

    fn seed(drive: &MemoryDrive, girls: usize, boys: usize) {
        for i in 0..girls {
            drive.add_image("girls", &format!("G{}_Girl{}.png", i, i), png_bytes(16, 16));
        }
        for i in 0..boys {
            drive.add_image("boys", &format!("B{}_Boy{}.png", i, i), png_bytes(16, 16));
        }
    }

    #[tokio::test]
    async fn test_refresh_loads_and_resizes() {
        let drive = Arc::new(MemoryDrive::new());
        seed(&drive, 3, 2);
        let assets = manager(drive);

        let report = assets.refresh().await.unwrap();
        assert_eq!(report, RefreshReport { idols: 5, skipped: 0 });

        let roster = assets.roster();
        assert_eq!(roster.count(GenderFilter::Girl), 3);
        assert_eq!(roster.count(GenderFilter::Boy), 2);
        let idol = roster.get("G0_Girl0").unwrap();
        assert_eq!(idol.images[0].height(), 8);
        assert_eq!(idol.group_name, "G0");
    }

    #[tokio::test]
    async fn test_refresh_merges_variants_and_skips_failures() {
        let drive = Arc::new(MemoryDrive::new());
        drive.add_image("girls", "PRISTIN_Nayoung.png", png_bytes(16, 16));
        drive.add_file("girls", "PRISTIN_Nayoung.jpg", "image/jpeg", png_bytes(20, 20));
        let broken = drive.add_image("girls", "PRISTIN_Kyla.png", png_bytes(16, 16));
        drive.break_url(&broken.content_link);
        drive.add_image("girls", "notanidol.png", png_bytes(16, 16));
        drive.add_file("girls", "readme.txt", "text/plain", b"hello".to_vec());

        let assets = manager(drive);
        let report = assets.refresh().await.unwrap();
        assert_eq!(report.idols, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(assets.roster().get("PRISTIN_Nayoung").unwrap().images.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_listing_keeps_old_roster() {
        let drive = Arc::new(MemoryDrive::new());
        seed(&drive, 4, 0);
        let assets = manager(drive.clone());
        assets.refresh().await.unwrap();

        drive.fail_listing.store(true, Ordering::SeqCst);
        assert!(assets.refresh().await.is_err());
        assert_eq!(assets.roster().len(), 4);
    }

    #[tokio::test]
    async fn test_refresh_is_observationally_atomic() {
        let drive = Arc::new(MemoryDrive::new().with_fetch_delay(Duration::from_millis(5)));
        seed(&drive, 10, 0);
        let assets = Arc::new(manager(drive.clone()));
        assets.refresh().await.unwrap();

        for i in 10..30 {
            drive.add_image("girls", &format!("G{}_Girl{}.png", i, i), png_bytes(16, 16));
        }

        let refresher = {
            let assets = assets.clone();
            tokio::spawn(async move { assets.refresh().await })
        };

        let mut seen = Vec::new();
        while !refresher.is_finished() {
            seen.push(assets.roster().len());
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        refresher.await.unwrap().unwrap();
        seen.push(assets.roster().len());

        assert!(seen.iter().all(|n| *n == 10 || *n == 30), "saw {:?}", seen);
        assert_eq!(*seen.last().unwrap(), 30);
    }

    #[tokio::test]
    async fn test_refresh_caps_concurrent_fetches() {
        let drive = Arc::new(MemoryDrive::new().with_fetch_delay(Duration::from_millis(5)));
        seed(&drive, 20, 12);
        let assets = manager(drive.clone());

        let report = assets.refresh().await.unwrap();
        assert_eq!(report.idols, 32);
        let peak = drive.peak_in_flight.load(Ordering::SeqCst);
        assert!(peak <= config().fetch_concurrency, "peak was {}", peak);
        assert!(peak > 1, "fetches never overlapped");
    }

    #[tokio::test]
    async fn test_hanging_fetch_is_skipped_after_timeout() {
        let drive = Arc::new(MemoryDrive::new());
        seed(&drive, 5, 0);
        let stuck = drive.add_image("girls", "Stuck_Forever.png", png_bytes(16, 16));
        drive.hang_url(&stuck.content_link);

        let mut assets = manager(drive);
        assets.fetch_timeout = Duration::from_millis(50);
        let report = tokio::time::timeout(Duration::from_secs(5), assets.refresh())
            .await
            .expect("refresh should not wait on a hanging fetch")
            .unwrap();

        assert_eq!(report, RefreshReport { idols: 5, skipped: 1 });
        assert!(assets.roster().get("Stuck_Forever").is_none());
    }

    #[tokio::test]
    async fn test_pick_contestants() {
        let drive = Arc::new(MemoryDrive::new());
        seed(&drive, 6, 40);
        let assets = manager(drive);
        assets.refresh().await.unwrap();

        let picked = assets.pick_contestants(GenderFilter::Boy, 32).unwrap();
        assert_eq!(picked.len(), 32);
        let mut ids: Vec<&str> = picked.iter().map(|i| i.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 32);
        assert!(picked.iter().all(|i| i.gender == Gender::Boy));

        match assets.pick_contestants(GenderFilter::Boy, 64) {
            Err(BotError::InsufficientRoster {
                requested,
                available,
            }) => {
                assert_eq!(requested, 64);
                assert_eq!(available, 40);
            }
            other => panic!("expected InsufficientRoster, got {:?}", other.map(|v| v.len())),
        }

        assert_eq!(assets.pick_contestants(GenderFilter::Mixed, 46).unwrap().len(), 46);
    }

    #[tokio::test]
    async fn test_variant_is_stable_within_a_game() {
        let drive = Arc::new(MemoryDrive::new());
        for ext in ["png", "gif", "jpg"] {
            drive.add_image("girls", &format!("PRISTIN_Nayoung.{}", ext), png_bytes(16, 16));
        }
        let assets = manager(drive);
        assets.refresh().await.unwrap();

        let idol = assets.roster().get("PRISTIN_Nayoung").unwrap().clone();
        assert_eq!(idol.images.len(), 3);

        let mut memo = HashMap::new();
        let first = assets.variant_for(&idol, &mut memo).unwrap();
        for _ in 0..10 {
            let again = assets.variant_for(&idol, &mut memo).unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
    }

    #[tokio::test]
    async fn test_stale_variant_index_is_repicked() {
        let drive = Arc::new(MemoryDrive::new());
        drive.add_image("girls", "PRISTIN_Nayoung.png", png_bytes(16, 16));
        let assets = manager(drive);
        assets.refresh().await.unwrap();

        let idol = assets.roster().get("PRISTIN_Nayoung").unwrap().clone();
        let mut memo = HashMap::from([(idol.id.clone(), 5usize)]);
        assets.variant_for(&idol, &mut memo).unwrap();
        assert_eq!(memo[&idol.id], 0);
    }

    #[tokio::test]
    async fn test_add_single_merges_into_roster() {
        let drive = Arc::new(MemoryDrive::new());
        seed(&drive, 2, 0);
        let assets = manager(drive.clone());
        assets.refresh().await.unwrap();

        let new_idol = drive.add_image("girls", "PRISTIN_Nayoung.png", png_bytes(16, 16));
        assets.add_single(&new_idol, Gender::Girl).await.unwrap();
        let variant = drive.add_image("girls", "G0_Girl0.png", png_bytes(16, 16));
        assets.add_single(&variant, Gender::Girl).await.unwrap();

        let roster = assets.roster();
        assert_eq!(roster.len(), 3);
        assert_eq!(roster.get("G0_Girl0").unwrap().images.len(), 2);
    }

    #[tokio::test]
    async fn test_load_overlays() {
        let drive = MemoryDrive::new();
        for name in [VERSES_FILE, SHADOW_BORDER_FILE, CROWN_FILE] {
            drive.add_image("misc", name, png_bytes(20, 40));
        }
        let timeout = Duration::from_secs(1);

        let missing = load_overlays(&drive, &drive, "misc", BracketLayout::default(), 8, timeout).await;
        assert!(matches!(missing, Err(BotError::MissingAsset { name }) if name == BRACKET_FILE));

        drive.add_image("misc", BRACKET_FILE, png_bytes(64, 64));
        let overlays = load_overlays(&drive, &drive, "misc", BracketLayout::default(), 8, timeout)
            .await
            .unwrap();
        assert_eq!(overlays.verses.height(), 38);
        assert_eq!(overlays.shadow_border.height(), 38);
        assert_eq!(overlays.crown.width(), 4);
        assert_eq!(overlays.bracket.dimensions(), (64, 64));
    }
}
