#![cfg(feature = "sqlite")]

use relay_storage::{
    DcAddress, InputPeer, PeerType, PeerUpdate, SqliteStorage, Storage, StorageError, UpdateState,
};

fn peer(id: i64, peer_type: PeerType) -> PeerUpdate {
    PeerUpdate {
        id,
        access_hash: id.wrapping_mul(7),
        peer_type,
        username: None,
        phone_number: None,
    }
}

async fn open_memory() -> SqliteStorage {
    let storage = SqliteStorage::memory();
    storage.open().await.unwrap();
    storage
}

#[tokio::test]
async fn open_seeds_a_default_session() {
    let storage = open_memory().await;
    assert_eq!(storage.dc_id().await.unwrap(), 2);
    assert_eq!(storage.date().await.unwrap(), 0);
    assert!(!storage.test_mode().await.unwrap());
    assert!(!storage.is_bot().await.unwrap());
    assert_eq!(storage.api_id().await.unwrap(), None);
    assert_eq!(storage.auth_key().await.unwrap(), None);
    assert_eq!(storage.user_id().await.unwrap(), None);
}

#[tokio::test]
async fn scalar_accessors_round_trip() {
    let storage = open_memory().await;
    storage.set_dc_id(4).await.unwrap();
    storage.set_api_id(17349).await.unwrap();
    storage.set_test_mode(true).await.unwrap();
    storage.set_user_id(5_096_231_338).await.unwrap();
    storage.set_is_bot(true).await.unwrap();
    let key = vec![0x5Au8; 256];
    storage.set_auth_key(Some(&key)).await.unwrap();

    assert_eq!(storage.dc_id().await.unwrap(), 4);
    assert_eq!(storage.api_id().await.unwrap(), Some(17349));
    assert!(storage.test_mode().await.unwrap());
    assert_eq!(storage.user_id().await.unwrap(), Some(5_096_231_338));
    assert!(storage.is_bot().await.unwrap());
    assert_eq!(storage.auth_key().await.unwrap(), Some(key));

    storage.set_auth_key(None).await.unwrap();
    assert_eq!(storage.auth_key().await.unwrap(), None);
}

#[tokio::test]
async fn save_refreshes_the_date_stamp() {
    let storage = open_memory().await;
    assert_eq!(storage.date().await.unwrap(), 0);
    storage.save().await.unwrap();
    assert!(storage.date().await.unwrap() > 0);
}

#[tokio::test]
async fn closed_storage_rejects_operations() {
    let storage = open_memory().await;
    storage.close().await.unwrap();
    assert!(matches!(storage.dc_id().await, Err(StorageError::NotOpen)));
    // Closing twice is fine.
    storage.close().await.unwrap();
}

#[tokio::test]
async fn delete_drops_the_session_row() {
    let storage = open_memory().await;
    storage.delete().await.unwrap();
    assert!(matches!(storage.dc_id().await, Err(StorageError::NotFound(_))));
}

#[tokio::test]
async fn session_string_round_trips_through_storage() {
    let storage = open_memory().await;
    storage.set_dc_id(5).await.unwrap();
    storage.set_api_id(94_571).await.unwrap();
    storage.set_user_id(42).await.unwrap();
    storage.set_auth_key(Some(&[0xC3u8; 256])).await.unwrap();

    let exported = storage.export_session_string().await.unwrap();

    let imported = open_memory().await;
    imported.import_session_string(&exported).await.unwrap();
    assert_eq!(imported.dc_id().await.unwrap(), 5);
    assert_eq!(imported.api_id().await.unwrap(), Some(94_571));
    assert_eq!(imported.user_id().await.unwrap(), Some(42));
    assert_eq!(imported.auth_key().await.unwrap(), Some(vec![0xC3u8; 256]));
    assert_eq!(imported.export_session_string().await.unwrap(), exported);
}

#[tokio::test]
async fn exporting_without_an_auth_key_fails() {
    let storage = open_memory().await;
    assert!(matches!(
        storage.export_session_string().await,
        Err(StorageError::BadSession(_))
    ));
}

#[tokio::test]
async fn peer_lookup_by_id_maps_each_kind() {
    let storage = open_memory().await;
    storage
        .update_peers(&[
            peer(101, PeerType::User),
            peer(-2002, PeerType::Group),
            peer(-1_001_234_567_890, PeerType::Channel),
        ])
        .await
        .unwrap();

    assert_eq!(
        storage.get_peer_by_id(101).await.unwrap(),
        InputPeer::User { user_id: 101, access_hash: 707 }
    );
    assert_eq!(
        storage.get_peer_by_id(-2002).await.unwrap(),
        InputPeer::Chat { chat_id: 2002 }
    );
    assert_eq!(
        storage.get_peer_by_id(-1_001_234_567_890).await.unwrap(),
        InputPeer::Channel {
            channel_id: 1_234_567_890,
            access_hash: (-1_001_234_567_890i64).wrapping_mul(7),
        }
    );
    assert!(matches!(
        storage.get_peer_by_id(999).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn peer_lookup_by_phone_number() {
    let storage = open_memory().await;
    storage
        .update_peers(&[PeerUpdate {
            id: 55,
            access_hash: 1,
            peer_type: PeerType::User,
            username: None,
            phone_number: Some("19876543210".into()),
        }])
        .await
        .unwrap();

    assert_eq!(
        storage.get_peer_by_phone_number("19876543210").await.unwrap(),
        InputPeer::User { user_id: 55, access_hash: 1 }
    );
    assert!(matches!(
        storage.get_peer_by_phone_number("000").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn update_state_upserts_and_removes() {
    let storage = open_memory().await;
    let common = UpdateState { id: 0, pts: 100, qts: 2, date: 1_700_000_000, seq: 9 };
    let channel = UpdateState { id: 1_234, pts: 50, ..Default::default() };

    storage.update_state(common).await.unwrap();
    storage.update_state(channel).await.unwrap();
    storage
        .update_state(UpdateState { pts: 101, ..common })
        .await
        .unwrap();

    let mut states = storage.states().await.unwrap();
    states.sort_by_key(|s| s.id);
    assert_eq!(states.len(), 2);
    assert_eq!(states[0].pts, 101);
    assert_eq!(states[1], channel);

    storage.remove_state(1_234).await.unwrap();
    assert_eq!(storage.states().await.unwrap().len(), 1);
}

#[tokio::test]
async fn dc_addresses_upsert_on_their_key() {
    let storage = open_memory().await;
    let dc = DcAddress {
        dc_id: 4,
        address: "149.154.167.91".into(),
        port: 443,
        is_ipv6: false,
        is_media: false,
        is_default_ip: true,
    };
    storage.update_dc_address(dc.clone()).await.unwrap();
    // Redirect to a fresh address for the same key.
    storage
        .update_dc_address(DcAddress {
            address: "149.154.167.92".into(),
            is_default_ip: false,
            ..dc.clone()
        })
        .await
        .unwrap();

    let found = storage.get_dc_address(4, false, false).await.unwrap().unwrap();
    assert_eq!(found.address, "149.154.167.92");
    assert!(!found.is_default_ip);

    assert_eq!(storage.get_dc_address(1, false, false).await.unwrap(), None);
}

#[tokio::test]
async fn media_flag_is_normalized_for_non_media_dcs() {
    let storage = open_memory().await;
    storage
        .update_dc_address(DcAddress {
            dc_id: 1,
            address: "149.154.175.53".into(),
            port: 443,
            is_ipv6: false,
            is_media: true,
            is_default_ip: true,
        })
        .await
        .unwrap();

    // Stored under the non-media key, and a media query finds it there.
    let found = storage.get_dc_address(1, false, true).await.unwrap().unwrap();
    assert!(!found.is_media);
    assert!(storage.get_dc_address(1, false, false).await.unwrap().is_some());
}

#[tokio::test]
async fn version_reports_current_schema() {
    let storage = open_memory().await;
    assert_eq!(storage.version().await.unwrap(), 4);
    storage.set_version(5).await.unwrap();
    assert_eq!(storage.version().await.unwrap(), 5);
}

#[tokio::test]
async fn reopening_an_old_schema_migrates_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.session");

    {
        let storage = SqliteStorage::new(&path);
        storage.open().await.unwrap();
        storage.close().await.unwrap();
    }

    // Rewind the file to schema v1 by hand: drop everything the migrations
    // added and reset the version counter.
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "DROP TABLE usernames;
             DROP TABLE update_state;
             DROP TABLE dc_options;
             UPDATE version SET number = 1;",
        )
        .unwrap();
    }

    let storage = SqliteStorage::new(&path);
    storage.open().await.unwrap();
    assert_eq!(storage.version().await.unwrap(), 4);

    // The migrated tables are live again.
    storage
        .update_state(UpdateState { id: 0, pts: 1, ..Default::default() })
        .await
        .unwrap();
    storage.update_usernames(&[(1, vec!["name".into()])]).await.unwrap();
    assert!(storage.get_dc_address(2, false, false).await.unwrap().is_none());
}

#[tokio::test]
async fn file_backed_sessions_persist_across_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.session");

    {
        let storage = SqliteStorage::new(&path);
        storage.open().await.unwrap();
        storage.set_dc_id(3).await.unwrap();
        storage.update_peers(&[peer(12, PeerType::User)]).await.unwrap();
        storage.save().await.unwrap();
        storage.close().await.unwrap();
    }

    let storage = SqliteStorage::new(&path);
    storage.open().await.unwrap();
    assert_eq!(storage.dc_id().await.unwrap(), 3);
    assert!(storage.get_peer_by_id(12).await.is_ok());
}
