//! Integration tests for the reseed engine: rebuild pipeline, bundle
//! population sizing, the rebuild floor, and atomic publication under
//! concurrent readers.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;

use rsa::RsaPrivateKey;

use seedbank_server::bundle::unzip_seeds;
use seedbank_server::netdb::{LocalNetDb, NetDb, RouterInfo};
use seedbank_server::reseeder::{Peer, ReseedError, Reseeder};
use su3::Su3File;

// Keygen dominates test time, so every test shares one 2048-bit key.
static KEY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap());

const SIGNER: &[u8] = b"test@seedbank.i2p";

/// In-memory netDb with an adjustable router-info count.
struct SyntheticNetDb {
    count: AtomicUsize,
}

impl SyntheticNetDb {
    fn new(count: usize) -> Self {
        SyntheticNetDb {
            count: AtomicUsize::new(count),
        }
    }

    fn set_count(&self, count: usize) {
        self.count.store(count, Ordering::SeqCst);
    }
}

impl NetDb for SyntheticNetDb {
    fn router_infos(&self) -> io::Result<Vec<RouterInfo>> {
        Ok((0..self.count.load(Ordering::SeqCst))
            .map(|i| RouterInfo {
                name: format!("routerInfo-mem{i}.dat"),
                mod_time: SystemTime::now(),
                data: format!("synthetic router info {i}").into_bytes(),
            })
            .collect())
    }
}

fn temp_netdb_dir(files: usize) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "seedbank-test-reseed-{}",
        rand::random::<u64>()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    for i in 0..files {
        std::fs::write(
            dir.join(format!("routerInfo-dir{i}.dat")),
            format!("router info from disk {i}"),
        )
        .unwrap();
    }
    dir
}

fn engine(netdb: Arc<dyn NetDb>) -> Arc<Reseeder> {
    Arc::new(Reseeder::new(netdb, SIGNER, KEY.clone()).unwrap())
}

#[tokio::test]
async fn bundle_population_from_directory() {
    // 200 files on disk, 75 per bundle, auto-sized population: the pool
    // after truncation is 150, which lands in the smallest band.
    let dir = temp_netdb_dir(200);
    let netdb = Arc::new(LocalNetDb::new(&dir));
    let reseeder = Arc::new(
        Reseeder::new(netdb, SIGNER, KEY.clone())
            .unwrap()
            .with_num_ri(75),
    );

    let handle = Arc::clone(&reseeder).start().await;

    let bundles = reseeder.bundles();
    assert_eq!(bundles.len(), 50);

    for bytes in bundles.iter() {
        let file = Su3File::decode(bytes).unwrap();
        file.verify_with_key(&KEY.to_public_key()).unwrap();

        let seeds = unzip_seeds(&file.content).unwrap();
        assert_eq!(seeds.len(), 75);
        for seed in &seeds {
            assert!(seed.name.starts_with("routerInfo-dir"));
        }
    }

    handle.stop().await;
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn rebuild_floor_keeps_previous_set() {
    let netdb = Arc::new(SyntheticNetDb::new(100));
    let reseeder = Arc::new(
        Reseeder::new(Arc::clone(&netdb) as Arc<dyn NetDb>, SIGNER, KEY.clone())
            .unwrap()
            .with_num_ri(10)
            .with_num_su3(4),
    );

    reseeder.rebuild().await.unwrap();
    let before = reseeder.su3_bytes_for(&Peer("10.0.0.1".into())).unwrap();

    // 8 router infos truncate to 6, below the 10-per-bundle floor.
    netdb.set_count(8);
    let err = reseeder.rebuild().await.unwrap_err();
    assert!(matches!(
        err,
        ReseedError::InsufficientDescriptors { have: 6, need: 10 }
    ));

    let after = reseeder.su3_bytes_for(&Peer("10.0.0.1".into())).unwrap();
    assert_eq!(before, after, "failed rebuild must not disturb the cache");
}

#[tokio::test]
async fn engine_not_ready_before_first_rebuild() {
    let netdb = Arc::new(SyntheticNetDb::new(0));
    let reseeder = engine(netdb);
    assert!(matches!(
        reseeder.su3_bytes_for(&Peer("10.0.0.1".into())),
        Err(ReseedError::NotReady)
    ));
}

#[tokio::test]
async fn stop_makes_engine_not_ready() {
    let netdb = Arc::new(SyntheticNetDb::new(200));
    let reseeder = Arc::new(
        Reseeder::new(netdb, SIGNER, KEY.clone())
            .unwrap()
            .with_num_ri(10)
            .with_num_su3(4),
    );

    let handle = Arc::clone(&reseeder).start().await;
    assert!(reseeder.su3_bytes_for(&Peer("10.0.0.1".into())).is_ok());

    handle.stop().await;
    assert!(matches!(
        reseeder.su3_bytes_for(&Peer("10.0.0.1".into())),
        Err(ReseedError::NotReady)
    ));
}

#[tokio::test]
async fn peer_selection_is_sticky_and_spread() {
    let netdb = Arc::new(SyntheticNetDb::new(400));
    let reseeder = Arc::new(
        Reseeder::new(netdb, SIGNER, KEY.clone())
            .unwrap()
            .with_num_ri(10)
            .with_num_su3(8),
    );
    reseeder.rebuild().await.unwrap();

    let peer = Peer("1.2.3.4".into());
    let first = reseeder.su3_bytes_for(&peer).unwrap();
    for _ in 0..10 {
        assert_eq!(reseeder.su3_bytes_for(&peer).unwrap(), first);
    }

    // Different peers land on more than one bundle.
    let distinct: std::collections::HashSet<Vec<u8>> = (0..32)
        .map(|i| reseeder.su3_bytes_for(&Peer(format!("10.1.0.{i}"))).unwrap())
        .collect();
    assert!(distinct.len() > 1);
}

#[tokio::test]
async fn readers_never_observe_a_torn_set() {
    let netdb = Arc::new(SyntheticNetDb::new(300));
    let reseeder = Arc::new(
        Reseeder::new(netdb, SIGNER, KEY.clone())
            .unwrap()
            .with_num_ri(10)
            .with_num_su3(6),
    );
    reseeder.rebuild().await.unwrap();

    let mut readers = Vec::new();
    for r in 0..4 {
        let reseeder = Arc::clone(&reseeder);
        readers.push(tokio::spawn(async move {
            for i in 0..150 {
                let peer = Peer(format!("172.16.{r}.{}", i % 256));
                let bytes = reseeder.su3_bytes_for(&peer).unwrap();
                // Whatever set this came from, it is a complete signed
                // bundle with the full complement of router infos.
                let file = Su3File::decode(&bytes).unwrap();
                let seeds = unzip_seeds(&file.content).unwrap();
                assert_eq!(seeds.len(), 10);
                tokio::task::yield_now().await;
            }
        }));
    }

    for _ in 0..5 {
        reseeder.rebuild().await.unwrap();
    }

    for reader in readers {
        reader.await.unwrap();
    }
}
