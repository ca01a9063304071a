//! Reseed engine: samples the netDb into a population of pre-signed SU3
//! bundles and swaps the whole set atomically on a rebuild tick.
//!
//! Readers never block on a rebuild. The current bundle set lives in a
//! `watch` cell as one `Arc`; a lookup borrows the cell and clones the
//! pointer, the rebuilder publishes a complete replacement in one send.
//! A request therefore sees either the old set or the new set, never a
//! partial splice.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use su3::{SigType, Su3File, CONTENT_TYPE_RESEED, FILE_TYPE_ZIP};

use crate::bundle;
use crate::netdb::{NetDb, RouterInfo};

pub const DEFAULT_NUM_RI: usize = 75;
pub const DEFAULT_REBUILD_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Builder tasks racing over the seed channel during one rebuild.
const NUM_BUILDERS: usize = 3;

/// A request's remote identity. Opaque: it is only ever hashed, so a
/// bracketed IPv6 literal or a verbatim X-Forwarded-For value works the
/// same as a clean dotted quad.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer(pub String);

impl Peer {
    /// Stable hash used to pin a peer to one bundle across requests.
    pub fn hash(&self) -> u32 {
        crc32fast::hash(&Sha256::digest(self.0.as_bytes()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReseedError {
    #[error("unable to load router infos: {0}")]
    NetDb(#[from] io::Error),

    #[error("not enough router infos: {have} after truncation, need {need}")]
    InsufficientDescriptors { have: usize, need: usize },

    #[error("bundle packing failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Su3(#[from] su3::Su3Error),

    #[error("signing key must be 2048, 3072 or 4096 bits, got {0}")]
    UnsupportedKeySize(usize),

    #[error("every bundle build failed")]
    NothingBuilt,

    #[error("no reseed bundles available")]
    NotReady,
}

type BundleSet = Arc<Vec<Vec<u8>>>;

/// Signing material shared by the builder tasks of a rebuild.
#[derive(Clone)]
struct BundleSigner {
    signing_key: RsaPrivateKey,
    signature_type: SigType,
    signer_id: Vec<u8>,
}

impl BundleSigner {
    fn build(&self, seeds: &[RouterInfo]) -> Result<Vec<u8>, ReseedError> {
        let mut file = Su3File::new();
        file.signature_type = self.signature_type;
        file.file_type = FILE_TYPE_ZIP;
        file.content_type = CONTENT_TYPE_RESEED;
        file.signer_id = self.signer_id.clone();
        file.content = bundle::zip_seeds(seeds)?;
        file.sign(&self.signing_key)?;
        Ok(file.encode()?)
    }
}

pub struct Reseeder {
    netdb: Arc<dyn NetDb>,
    signer: BundleSigner,
    num_ri: usize,
    num_su3: usize,
    rebuild_interval: Duration,

    bundles_tx: watch::Sender<BundleSet>,
    bundles_rx: watch::Receiver<BundleSet>,
    stopped: AtomicBool,
}

impl Reseeder {
    /// A new engine. The signature type follows the key's modulus size,
    /// since the wire length of an RSA signature is exactly one modulus.
    pub fn new(
        netdb: Arc<dyn NetDb>,
        signer_id: impl Into<Vec<u8>>,
        signing_key: RsaPrivateKey,
    ) -> Result<Self, ReseedError> {
        let bits = signing_key.size() * 8;
        let signature_type =
            SigType::for_rsa_key_bits(bits).ok_or(ReseedError::UnsupportedKeySize(bits))?;

        let (bundles_tx, bundles_rx) = watch::channel(BundleSet::default());
        Ok(Reseeder {
            netdb,
            signer: BundleSigner {
                signing_key,
                signature_type,
                signer_id: signer_id.into(),
            },
            num_ri: DEFAULT_NUM_RI,
            num_su3: 0,
            rebuild_interval: DEFAULT_REBUILD_INTERVAL,
            bundles_tx,
            bundles_rx,
            stopped: AtomicBool::new(false),
        })
    }

    /// Router infos per bundle.
    pub fn with_num_ri(mut self, num_ri: usize) -> Self {
        self.num_ri = num_ri;
        self
    }

    /// Bundles per rebuild; 0 sizes the population from the pool.
    pub fn with_num_su3(mut self, num_su3: usize) -> Self {
        self.num_su3 = num_su3;
        self
    }

    pub fn with_rebuild_interval(mut self, interval: Duration) -> Self {
        self.rebuild_interval = interval;
        self
    }

    /// Fill the cache once, then keep rebuilding it on a ticker until the
    /// returned handle is stopped.
    pub async fn start(self: Arc<Self>) -> ReseederHandle {
        if let Err(e) = self.rebuild().await {
            warn!("initial rebuild failed: {e}");
        }

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let engine = Arc::clone(&self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.rebuild_interval);
            ticker.tick().await; // the immediate first tick
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = engine.rebuild().await {
                            warn!("rebuild failed: {e}");
                        }
                    }
                    _ = stop_rx.recv() => break,
                }
            }
        });

        ReseederHandle {
            engine: self,
            stop_tx,
            task,
        }
    }

    /// The bundle this peer is pinned to. `NotReady` until a rebuild has
    /// succeeded, and again after the engine is stopped.
    pub fn su3_bytes_for(&self, peer: &Peer) -> Result<Vec<u8>, ReseedError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ReseedError::NotReady);
        }

        let bundles = self.bundles_rx.borrow().clone();
        if bundles.is_empty() {
            return Err(ReseedError::NotReady);
        }

        let index = peer.hash() as usize % bundles.len();
        Ok(bundles[index].clone())
    }

    /// Snapshot of the currently published set.
    pub fn bundles(&self) -> BundleSet {
        self.bundles_rx.borrow().clone()
    }

    /// Rebuild the bundle population from the netDb and publish it. On any
    /// failure the previously published set stays in place.
    pub async fn rebuild(&self) -> Result<(), ReseedError> {
        info!("rebuilding su3 bundle cache");

        let netdb = Arc::clone(&self.netdb);
        let ris = tokio::task::spawn_blocking(move || netdb.router_infos())
            .await
            .map_err(io::Error::other)??;

        let pool = truncate_pool(ris);
        if pool.len() < self.num_ri {
            return Err(ReseedError::InsufficientDescriptors {
                have: pool.len(),
                need: self.num_ri,
            });
        }

        let num_su3 = if self.num_su3 != 0 {
            self.num_su3
        } else {
            auto_bundle_count(pool.len())
        };
        info!(
            bundles = num_su3,
            per_bundle = self.num_ri,
            pool = pool.len(),
            "building bundles"
        );

        let (seed_tx, seed_rx) = mpsc::channel::<Vec<RouterInfo>>(NUM_BUILDERS);
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(NUM_BUILDERS);

        // Seed producer: emit `num_su3` random samples, then close.
        let num_ri = self.num_ri;
        let producer: JoinHandle<()> = tokio::spawn(async move {
            for _ in 0..num_su3 {
                let seeds: Vec<RouterInfo> = {
                    let mut rng = rand::thread_rng();
                    pool.choose_multiple(&mut rng, num_ri).cloned().collect()
                };
                if seed_tx.send(seeds).await.is_err() {
                    break;
                }
            }
        });

        // Fan out to builders, fan in their output.
        let seed_rx = Arc::new(Mutex::new(seed_rx));
        for _ in 0..NUM_BUILDERS {
            let seed_rx = Arc::clone(&seed_rx);
            let out_tx = out_tx.clone();
            let signer = self.signer.clone();
            tokio::spawn(async move {
                loop {
                    let seeds = { seed_rx.lock().await.recv().await };
                    let Some(seeds) = seeds else { break };
                    match signer.build(&seeds) {
                        Ok(bytes) => {
                            if out_tx.send(bytes).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("bundle build failed: {e}"),
                    }
                }
            });
        }
        drop(out_tx);

        let mut fresh = Vec::with_capacity(num_su3);
        while let Some(bytes) = out_rx.recv().await {
            fresh.push(bytes);
        }
        let _ = producer.await;

        if fresh.is_empty() {
            return Err(ReseedError::NothingBuilt);
        }

        self.bundles_tx.send_replace(Arc::new(fresh));
        info!("done rebuilding");
        Ok(())
    }
}

/// Running engine. Stopping cancels the ticker and makes lookups return
/// `NotReady`; a rebuild already in flight may finish but its result is
/// never served.
pub struct ReseederHandle {
    engine: Arc<Reseeder>,
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReseederHandle {
    pub async fn stop(self) {
        self.engine.stopped.store(true, Ordering::Release);
        let _ = self.stop_tx.send(()).await;
        let _ = self.task.await;
    }
}

/// Drop the first quarter of the pool. The directory walk is unordered, so
/// this thins the pool by 25% with no freshness guarantee.
fn truncate_pool(mut ris: Vec<RouterInfo>) -> Vec<RouterInfo> {
    let cut = ris.len() / 4;
    ris.split_off(cut)
}

/// Population size when not configured explicitly: more bundles for a
/// bigger pool, so the full netDb gets covered across peers.
fn auto_bundle_count(pool_len: usize) -> usize {
    match pool_len {
        n if n > 4000 => 300,
        n if n > 3000 => 200,
        n if n > 2000 => 100,
        n if n > 1000 => 75,
        _ => 50,
    }
}
