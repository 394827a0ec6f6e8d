//! Filtering pipeline: blacklist, customer category, then credit bureau.
//!
//! The record moves `Intake -> BlacklistChecked -> CategoryChecked ->
//! (BureauChecked) -> Finalized`. Every raw upstream payload is written before
//! it is interpreted and every transition appends a trail entry, so a failure
//! mid-way leaves everything up to that point on the record.

use crate::blacklist::{self, DupcheckReplies};
use crate::config::EvaluationSettings;
use crate::credit_bureau::{self, BureauOutcome, CreditBureauEvaluator, CODE_PBK_DOWN};
use crate::customer_category::{self, CustomerCategoryClassifier};
use crate::db_storage::{persistence_failure, ApplicantRecordStore};
use crate::errors::{AppError, ResultExt};
use crate::models::{
    Decision, DupcheckResult, FilteringRequest, FilteringResult, Identity, NewRecord,
    PipelineStage, RawSource, RecordKind, RecordPatch, StageTrace,
};
use crate::services::ExternalServiceClient;
use crate::upstream_models::UpstreamReply;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct FilteringPipeline {
    client: Arc<dyn ExternalServiceClient>,
    store: Arc<dyn ApplicantRecordStore>,
    classifier: CustomerCategoryClassifier,
    bureau: CreditBureauEvaluator,
}

impl FilteringPipeline {
    pub fn new(
        client: Arc<dyn ExternalServiceClient>,
        store: Arc<dyn ApplicantRecordStore>,
        settings: EvaluationSettings,
        token_ttl: Duration,
    ) -> Self {
        let bureau = CreditBureauEvaluator::new(
            client.clone(),
            store.clone(),
            settings.bureau_enabled,
            settings.dummy_enabled,
        );
        let classifier = CustomerCategoryClassifier::new(client.clone(), settings, token_ttl);

        Self {
            client,
            store,
            classifier,
            bureau,
        }
    }

    async fn patch(&self, request_id: Uuid, patch: RecordPatch) -> Result<(), AppError> {
        self.store
            .update(request_id, patch)
            .await
            .map_err(persistence_failure)
    }

    async fn save_raw(
        &self,
        request_id: Uuid,
        source: RawSource,
        reply: &UpstreamReply,
    ) -> Result<(), AppError> {
        self.patch(
            request_id,
            RecordPatch::RawResponse {
                source,
                payload: reply.payload.clone(),
            },
        )
        .await
        .with_context(|| format!("saving {} payload", source.key()))
    }

    /// Calls dupcheck for the applicant and, when present, the spouse. The two
    /// calls run concurrently and each reply is saved as soon as its call
    /// returns; either call failing fails the stage.
    async fn dupcheck(
        &self,
        request_id: Uuid,
        applicant: &Identity,
        spouse: Option<&Identity>,
    ) -> Result<DupcheckReplies, AppError> {
        let applicant_call = async {
            let reply = self
                .client
                .call_dupcheck(applicant)
                .await
                .context("dupcheck for applicant")?;
            self.save_raw(request_id, RawSource::DupcheckApplicant, &reply)
                .await?;
            Ok::<_, AppError>(reply)
        };
        let spouse_call = async {
            let Some(identity) = spouse else {
                return Ok(None);
            };
            let reply = self
                .client
                .call_dupcheck(identity)
                .await
                .context("dupcheck for spouse")?;
            self.save_raw(request_id, RawSource::DupcheckSpouse, &reply)
                .await?;
            Ok::<_, AppError>(Some(reply))
        };

        let (applicant, spouse) = tokio::join!(applicant_call, spouse_call);
        Ok(DupcheckReplies {
            applicant: applicant?,
            spouse: spouse?,
        })
    }

    async fn save_stage(
        &self,
        request_id: Uuid,
        stage: PipelineStage,
        result: &DupcheckResult,
    ) -> Result<(), AppError> {
        let trace = StageTrace {
            stage,
            code: result.code,
            decision: Some(result.decision),
            reason: result.reason.clone(),
            at: Utc::now(),
        };
        self.patch(request_id, RecordPatch::Stage { trace })
            .await
            .with_context(|| format!("saving {} stage", stage.as_str()))
    }

    async fn finalize(
        &self,
        request_id: Uuid,
        result: DupcheckResult,
    ) -> Result<FilteringResult, AppError> {
        let output = FilteringResult {
            request_id,
            code: result.code,
            decision: result.decision,
            reason: result.reason,
            status_konsumen: result.status_konsumen,
            category: result.category,
            next_process: result.next_process,
            is_blacklist: result.decision != Decision::Pass,
            pbk_report: result.pbk_report,
            total_baki_debet: result.total_baki_debet,
        };

        let trace = StageTrace {
            stage: PipelineStage::Finalized,
            code: output.code,
            decision: Some(output.decision),
            reason: output.reason.clone(),
            at: Utc::now(),
        };
        self.patch(
            request_id,
            RecordPatch::Finalized {
                trace,
                result: serde_json::to_value(&output)?,
            },
        )
        .await
        .context("finalizing record")?;

        tracing::info!(
            "Filtering {} finalized: {} {} ({})",
            request_id,
            output.code,
            output.decision,
            output.reason
        );
        Ok(output)
    }

    /// Runs one submission. `received_at` is taken once at request entry.
    pub async fn run(
        &self,
        request: FilteringRequest,
        received_at: DateTime<Utc>,
    ) -> Result<FilteringResult, AppError> {
        request.validate(received_at)?;

        let record = NewRecord::submission(
            RecordKind::Filtering,
            &request.prospect_id,
            received_at,
            serde_json::to_value(&request)?,
        );
        let request_id = self
            .store
            .create(record)
            .await
            .map_err(persistence_failure)
            .context("creating filtering record")?;

        tracing::info!(
            "Filtering {} started for prospect {} (branch {}, spouse: {})",
            request_id,
            request.prospect_id,
            request.branch_id,
            request.spouse().is_some()
        );

        let applicant = &request.applicant;
        let spouse = request.spouse();

        // Blacklist
        let replies = self
            .dupcheck(request_id, &applicant.identity, spouse.map(|s| &s.identity))
            .await?;

        let blacklisted = blacklist::evaluate(&replies).context("blacklist stage")?;
        self.save_stage(request_id, PipelineStage::BlacklistChecked, &blacklisted)
            .await?;
        if !blacklisted.next_process {
            return self.finalize(request_id, blacklisted).await;
        }

        // Customer category
        let reply = self.classifier.fetch(&applicant.identity).await?;
        self.save_raw(request_id, RawSource::CustomerDomain, &reply)
            .await?;
        let segmentation =
            customer_category::segment(&reply, self.classifier.dummy_segment_name())
                .context("customer category stage")?;

        let status = blacklisted.status_konsumen;
        let priority = if segmentation.is_preferential(status) {
            let bureau_reply = self
                .bureau
                .fetch(&request.prospect_id, applicant, spouse)
                .await?;
            if let Some(reply) = &bureau_reply {
                self.save_raw(request_id, RawSource::Bureau, reply).await?;
            }
            Some(credit_bureau::priority_report(bureau_reply.as_ref())?)
        } else {
            None
        };

        let categorized = customer_category::evaluate(&segmentation, status, priority);
        self.save_stage(request_id, PipelineStage::CategoryChecked, &categorized)
            .await?;
        if !categorized.next_process {
            return self.finalize(request_id, categorized).await;
        }

        // Credit bureau
        let bureau_reply = self
            .bureau
            .fetch(&request.prospect_id, applicant, spouse)
            .await?;
        if let Some(reply) = &bureau_reply {
            self.save_raw(request_id, RawSource::Bureau, reply).await?;
        }

        let outcome = credit_bureau::evaluate(
            bureau_reply.as_ref(),
            applicant.bpkb_name_type,
            categorized.status_konsumen,
        )
        .context("credit bureau stage")?;

        match outcome {
            BureauOutcome::Pending { reason } => {
                let trace = StageTrace {
                    stage: PipelineStage::BureauPending,
                    code: CODE_PBK_DOWN,
                    decision: None,
                    reason: reason.clone(),
                    at: Utc::now(),
                };
                self.patch(request_id, RecordPatch::Pending { trace })
                    .await
                    .context("saving pending bureau stage")?;

                Err(AppError::UpstreamUnavailable(format!(
                    "{} (request {} pending)",
                    reason, request_id
                )))
            }
            BureauOutcome::Verdict(mut screened) => {
                screened.category = categorized.category;
                self.save_stage(request_id, PipelineStage::BureauChecked, &screened)
                    .await?;
                self.finalize(request_id, screened).await
            }
        }
    }
}
