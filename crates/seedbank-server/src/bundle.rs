//! ZIP packing for reseed bundles.
//!
//! One stored entry per router info, named after the source file. Entries
//! are stamped with the build time rather than the router info's mtime so
//! a bundle does not leak when individual peers were last seen.

use std::io::{Cursor, Read, Write};
use std::time::SystemTime;

use chrono::{Datelike, Timelike, Utc};
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::netdb::RouterInfo;

pub fn zip_seeds(seeds: &[RouterInfo]) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    let now = Utc::now();
    let mtime = zip::DateTime::from_date_and_time(
        now.year() as u16,
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
    )
    .unwrap_or_default();

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(mtime);

    for seed in seeds {
        writer.start_file(seed.name.as_str(), options)?;
        writer.write_all(&seed.data)?;
    }

    Ok(writer.finish()?.into_inner())
}

pub fn unzip_seeds(data: &[u8]) -> ZipResult<Vec<RouterInfo>> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let mut seeds = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        seeds.push(RouterInfo {
            name: entry.name().to_string(),
            mod_time: SystemTime::now(),
            data,
        });
    }

    Ok(seeds)
}
