//! Connection-quality aggregation for calls
//!
//! Turns raw per-participant telemetry into a quality tier and rolls all
//! participants' snapshots up into a call-level verdict. Snapshots are
//! short-lived cache entries, never durable state.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::CoreConfig;
use crate::error::Result;
use crate::models::{
    CallQuality, ConnectionStats, MediaStreamInfo, ParticipantQuality, QualityTier,
};
use crate::services::CallService;
use crate::store::EphemeralStore;

const CALL_QUALITY_PREFIX: &str = "call:quality:";

/// Classify raw telemetry into a tier; thresholds are checked best-first.
fn classify_tier(stats: &ConnectionStats) -> QualityTier {
    if stats.latency_ms < 100.0 && stats.packet_loss_percent < 1.0 && stats.jitter_ms < 20.0 {
        QualityTier::Excellent
    } else if stats.latency_ms < 200.0 && stats.packet_loss_percent < 3.0 && stats.jitter_ms < 50.0
    {
        QualityTier::Good
    } else if stats.latency_ms < 500.0 && stats.packet_loss_percent < 5.0 && stats.jitter_ms < 100.0
    {
        QualityTier::Fair
    } else {
        QualityTier::Poor
    }
}

/// Ingests participant telemetry and derives call-level quality
pub struct QualityService {
    store: Arc<dyn EphemeralStore>,
    calls: Arc<CallService>,
    quality_ttl: Duration,
}

impl QualityService {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        calls: Arc<CallService>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            store,
            calls,
            quality_ttl: config.quality_ttl,
        }
    }

    fn quality_key(call_id: &str, user_id: &str) -> String {
        format!("{CALL_QUALITY_PREFIX}{call_id}:{user_id}")
    }

    /// Classify and persist one participant's telemetry snapshot.
    pub async fn update_call_quality(
        &self,
        call_id: &str,
        user_id: &str,
        stats: ConnectionStats,
    ) -> Result<ParticipantQuality> {
        let quality = ParticipantQuality {
            latency_ms: stats.latency_ms,
            packet_loss_percent: stats.packet_loss_percent,
            jitter_ms: stats.jitter_ms,
            bitrate_kbps: stats.bitrate_kbps,
            tier: classify_tier(&stats),
            last_updated: Utc::now(),
        };

        let json = serde_json::to_string(&quality)?;
        self.store
            .set(
                &Self::quality_key(call_id, user_id),
                &json,
                Some(self.quality_ttl),
            )
            .await?;

        debug!(call_id, user_id, tier = ?quality.tier, "Participant quality updated");
        Ok(quality)
    }

    /// Latest snapshot for one participant; absent once the TTL has lapsed.
    pub async fn get_participant_quality(
        &self,
        call_id: &str,
        user_id: &str,
    ) -> Result<Option<ParticipantQuality>> {
        match self.store.get(&Self::quality_key(call_id, user_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Aggregate every participant's snapshot into a call-level verdict.
    ///
    /// Numeric metrics are plain averages. The overall tier is the rounded
    /// ordinal average of the participant tiers (poor=1 .. excellent=4),
    /// rounded half away from zero. A call with no telemetry reads as poor.
    pub async fn get_call_quality(&self, call_id: &str) -> Result<CallQuality> {
        let keys = self
            .store
            .keys(&format!("{CALL_QUALITY_PREFIX}{call_id}:*"))
            .await?;

        let mut snapshots: Vec<ParticipantQuality> = Vec::new();
        for key in keys {
            if let Some(json) = self.store.get(&key).await? {
                snapshots.push(serde_json::from_str(&json)?);
            }
        }

        if snapshots.is_empty() {
            return Ok(CallQuality {
                average_latency_ms: 0.0,
                average_packet_loss: 0.0,
                average_jitter: 0.0,
                average_bitrate: 0.0,
                overall_tier: QualityTier::Poor,
                last_updated: Utc::now(),
            });
        }

        let count = snapshots.len() as f64;
        let average_ordinal =
            snapshots.iter().map(|q| q.tier.ordinal() as f64).sum::<f64>() / count;

        Ok(CallQuality {
            average_latency_ms: snapshots.iter().map(|q| q.latency_ms).sum::<f64>() / count,
            average_packet_loss: snapshots.iter().map(|q| q.packet_loss_percent).sum::<f64>()
                / count,
            average_jitter: snapshots.iter().map(|q| q.jitter_ms).sum::<f64>() / count,
            average_bitrate: snapshots.iter().map(|q| q.bitrate_kbps).sum::<f64>() / count,
            overall_tier: QualityTier::from_ordinal(average_ordinal.round() as u8),
            last_updated: Utc::now(),
        })
    }

    /// Mirror view over a participant's media toggles owned by the call
    /// service. Absent when the call or the participant is unknown.
    pub async fn get_media_stream_info(
        &self,
        call_id: &str,
        user_id: &str,
    ) -> Result<Option<MediaStreamInfo>> {
        let Some(call) = self.calls.get_call(call_id).await? else {
            return Ok(None);
        };
        let Some(participant) = call.participant(user_id) else {
            return Ok(None);
        };

        Ok(Some(MediaStreamInfo {
            user_id: user_id.to_string(),
            has_audio: !participant.is_muted,
            has_video: participant.is_video_enabled,
            is_muted: participant.is_muted,
            is_video_enabled: participant.is_video_enabled,
            is_screen_sharing: participant.is_screen_sharing,
            video_quality: call.settings.video_quality,
            audio_quality: call.settings.audio_quality,
        }))
    }

    /// Write-through to the call service's media-toggle update.
    pub async fn update_media_stream_info(
        &self,
        call_id: &str,
        user_id: &str,
        info: &MediaStreamInfo,
    ) -> Result<bool> {
        self.calls
            .update_participant_media(
                call_id,
                user_id,
                Some(info.is_muted),
                Some(info.is_video_enabled),
                Some(info.is_screen_sharing),
            )
            .await
    }
}
