use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;

use crate::models::{StoredTrack, TrackRecord};

/// Create the track table when missing
pub async fn create_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;

    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS trcks (
                uid       SERIAL PRIMARY KEY,
                composer  TEXT NOT NULL DEFAULT '',
                title     TEXT NOT NULL DEFAULT '',
                performer TEXT NOT NULL DEFAULT '',
                date      TEXT NOT NULL DEFAULT '',
                album     TEXT NOT NULL DEFAULT '',
                genre     TEXT NOT NULL DEFAULT '',
                year      INTEGER NOT NULL DEFAULT 0,
                dur       INTEGER NOT NULL DEFAULT 0,
                part      INTEGER NOT NULL DEFAULT 0,
                time      TIMESTAMPTZ NOT NULL DEFAULT now()
             )",
        )
        .await
        .context("Failed to create trcks table")?;

    Ok(())
}

/// Insert a track, returning its uid
pub async fn insert_track(pool: &Pool, track: &TrackRecord) -> Result<i32> {
    let client = pool.get().await?;

    let row = client
        .query_one(
            "INSERT INTO trcks
             (composer, title, performer, date, album, genre, year, dur, part)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING uid",
            &[
                &track.composer,
                &track.title,
                &track.performer,
                &track.date,
                &track.album,
                &track.genre,
                &track.year,
                &track.duration,
                &track.part,
            ],
        )
        .await
        .context("Failed to insert track")?;

    Ok(row.get(0))
}

/// Get a track by uid
pub async fn get_track(pool: &Pool, uid: i32) -> Result<Option<StoredTrack>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT uid, composer, title, performer, date, album, genre, year, dur, part, time
             FROM trcks WHERE uid = $1",
            &[&uid],
        )
        .await
        .context("Failed to get track")?;

    Ok(row.map(|row| {
        let uid: i32 = row.get(0);
        let time: DateTime<Utc> = row.get(10);
        StoredTrack {
            uid: uid as u32,
            record: TrackRecord {
                composer: row.get(1),
                title: row.get(2),
                performer: row.get(3),
                date: row.get(4),
                album: row.get(5),
                genre: row.get(6),
                year: row.get(7),
                duration: row.get(8),
                part: row.get(9),
            },
            time,
        }
    }))
}

/// Number of stored tracks
pub async fn count_tracks(pool: &Pool) -> Result<i64> {
    let client = pool.get().await?;

    let row = client
        .query_one("SELECT COUNT(*) FROM trcks", &[])
        .await
        .context("Failed to count tracks")?;

    Ok(row.get(0))
}

/// Delete a track
pub async fn delete_track(pool: &Pool, uid: i32) -> Result<bool> {
    let client = pool.get().await?;

    let deleted = client
        .execute("DELETE FROM trcks WHERE uid = $1", &[&uid])
        .await
        .context("Failed to delete track")?;

    Ok(deleted > 0)
}
