use stowage_manifest::{
    BundleInfo, BundleKind, ChecksumInfo, FileMeta, LoadFlags, Manifest, ManifestCipher,
    ManifestIndex, decode_manifest, encode_manifest, is_local_valid,
};

fn game_manifest() -> Manifest {
    Manifest {
        build:      7,
        chunk_size: 512,
        tag:        "nightly".into(),
        bundles:    vec![
            BundleInfo::new("base.pkg", BundleKind::ZipArchive)
                .load(LoadFlags::STARTUP)
                .asset("shared/font.ttf"),
            BundleInfo::new("level1.pkg", BundleKind::AssetBundle)
                .load(LoadFlags::NORMAL)
                .depends_on("base.pkg")
                .asset("levels/1/map.bin")
                .priority(5),
            BundleInfo::new("intro.mp4", BundleKind::RawFile)
                .load(LoadFlags::OPTIONAL)
                .asset("video/intro.mp4"),
        ],
    }
}

#[test]
fn test_stored_manifest_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let cipher = ManifestCipher::from_password(b"build-secret", 512);
    let encoded = encode_manifest(&game_manifest(), Some(&cipher)).unwrap();

    let pkg = dir.path().join("manifest.pkg");
    let meta = dir.path().join("manifest.pkg.meta");
    std::fs::write(&pkg, &encoded.bytes).unwrap();
    FileMeta::new(&encoded.checksum.checksum, encoded.checksum.size)
        .write(&meta)
        .unwrap();

    assert!(is_local_valid(
        &pkg,
        &meta,
        &encoded.checksum.checksum,
        encoded.checksum.size
    ));

    // checksum.txt travels as JSON
    let wire = serde_json::to_string(&encoded.checksum).unwrap();
    assert!(wire.contains("\"chunkSize\":512"));
    let info: ChecksumInfo = serde_json::from_str(&wire).unwrap();

    let bytes = std::fs::read(&pkg).unwrap();
    let manifest = decode_manifest(&bytes, &info, Some(&cipher)).unwrap();
    let index = ManifestIndex::new(manifest).unwrap();

    assert_eq!(index.build(), 7);
    assert_eq!(
        index.bundle_for_asset("levels/1/map.bin").unwrap().dependencies,
        vec!["base.pkg"]
    );
    assert_eq!(
        index
            .matching(LoadFlags::STARTUP | LoadFlags::OPTIONAL)
            .count(),
        2
    );
}
