// ===============================
// src/recorder.rs
// ===============================
//
// Audit sink JSONL (append-only):
// - Tulis setiap AuditRecord ke file .jsonl, satu baris per record.
// - Bufer dengan BufWriter agar hemat syscall.
// - Flush periodik tiap 1s dan/atau tiap 100 record.
// - Otomatis membuat parent directory jika belum ada.
// - Jika tulis gagal, coba reopen file dan lanjut.
//
// Engine tidak pernah membaca file ini; hanya untuk rekonsiliasi.
//
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    task::JoinHandle,
    time::{interval, timeout, Duration, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::domain::AuditRecord;

const FLUSH_EVERY_N_RECORDS: u32 = 100;

async fn open_writer(path: &str) -> std::io::Result<BufWriter<tokio::fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<tokio::fs::File>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

pub async fn run(mut rx: mpsc::Receiver<AuditRecord>, path: String) -> std::io::Result<()> {
    let mut writer = open_writer(&path).await?;
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_rec = rx.recv() => {
                let Some(rec) = maybe_rec else {
                    // Channel closed: flush dan keluar
                    writer.flush().await?;
                    info!("recorder: channel closed, stopped");
                    return Ok(());
                };

                let line = match serde_json::to_string(&rec) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip record");
                        continue;
                    }
                };

                if let Err(e) = write_line(&mut writer, &line).await {
                    error!(?e, "recorder: write failed, attempting reopen");
                    let _ = writer.flush().await;
                    writer = open_writer(&path).await?;
                    if let Err(e2) = write_line(&mut writer, &line).await {
                        error!(?e2, "recorder: write failed again after reopen, drop record");
                        continue;
                    }
                }

                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_RECORDS {
                    writer.flush().await?;
                    since_last_flush = 0;
                }
            }

            _ = tick.tick() => {
                writer.flush().await?;
                since_last_flush = 0;
            }
        }
    }
}

/// Tunggu recorder menulis sisa buffer setelah semua sender ditutup.
/// Returns true when the file was flushed and closed cleanly.
pub async fn drain(handle: JoinHandle<std::io::Result<()>>, wait: Duration) -> bool {
    match timeout(wait, handle).await {
        Ok(Ok(Ok(()))) => true,
        Ok(Ok(Err(e))) => {
            error!(?e, "recorder: stopped with I/O error");
            false
        }
        Ok(Err(e)) => {
            error!(?e, "recorder: task failed");
            false
        }
        Err(_) => {
            warn!(?wait, "recorder: drain timed out, audit tail may be missing");
            false
        }
    }
}
