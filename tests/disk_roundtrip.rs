//! DOS 3.3 sector-order nibblization round-trips through the public
//! mount/export surface: what goes in as a .dsk image must come back out
//! byte-identical after being encoded to nibbles and decoded again.

use a2core::disk::{Disk2InterfaceCard, BYTES_PER_SECTOR, DSK_SIZE, SECTORS_PER_TRACK, TRACKS};

fn sample_dsk() -> Vec<u8> {
    let mut data = vec![0u8; DSK_SIZE];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i % 256) as u8;
    }
    data
}

#[test]
fn dos_image_round_trips_through_nibblization() {
    let mut disk = Disk2InterfaceCard::new();
    let original = sample_dsk();
    disk.load_image(0, &original, Some("dsk")).unwrap();

    let exported = disk.export_disk(0).unwrap();
    assert_eq!(exported.len(), DSK_SIZE);
    assert_eq!(exported, original);
}

#[test]
fn every_sector_decodes_through_the_cache() {
    let mut disk = Disk2InterfaceCard::new();
    let original = sample_dsk();
    disk.load_image(0, &original, Some("dsk")).unwrap();

    for track in 0..TRACKS {
        for sector in 0..SECTORS_PER_TRACK {
            let decoded = disk
                .read_sector_cached(0, track, sector)
                .unwrap_or_else(|| panic!("track {track} sector {sector} failed to decode"));
            let offset = (track * SECTORS_PER_TRACK + sector) * BYTES_PER_SECTOR;
            assert_eq!(&decoded[..], &original[offset..offset + BYTES_PER_SECTOR]);
        }
    }
}

#[test]
fn empty_drive_has_no_metadata_to_export() {
    let disk = Disk2InterfaceCard::new();
    assert!(disk.export_disk(0).is_err());
}

#[test]
fn ejecting_clears_the_loaded_flag() {
    let mut disk = Disk2InterfaceCard::new();
    disk.load_image(0, &sample_dsk(), Some("dsk")).unwrap();
    assert!(disk.drives[0].disk.disk_loaded);
    disk.eject_disk(0);
    assert!(!disk.drives[0].disk.disk_loaded);
}
