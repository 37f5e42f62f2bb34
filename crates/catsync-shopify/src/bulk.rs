//! Staged uploads and bulk mutation jobs.
//!
//! A bulk job runs in four remote steps: reserve an upload slot, POST the
//! JSONL payload to it, start `bulkOperationRunMutation` against the staged
//! path, then poll the operation node until it reaches a terminal status.
//! Polling policy lives with the caller; this module only issues the calls.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;

use crate::client::{check_user_errors, ShopifyClient};
use crate::error::{ShopifyError, UserError};
use crate::queries;
use crate::types::{BulkOperation, StagedTarget};

pub const BULK_UPLOAD_FILENAME: &str = "bulk-operation.jsonl";
const BULK_UPLOAD_MIME: &str = "text/jsonl";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StagedUploadsPayload {
    #[serde(default)]
    staged_targets: Vec<StagedTarget>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StagedUploadsData {
    staged_uploads_create: StagedUploadsPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunMutationPayload {
    bulk_operation: Option<BulkOperation>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunMutationData {
    bulk_operation_run_mutation: RunMutationPayload,
}

#[derive(Deserialize)]
struct NodeData {
    node: Option<BulkOperation>,
}

impl ShopifyClient {
    /// Reserves a writable location for a bulk-mutation variables file.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::UserErrors`] if the platform refuses, or
    /// [`ShopifyError::MissingData`] if no target comes back.
    pub async fn create_staged_upload(&self) -> Result<StagedTarget, ShopifyError> {
        let data: StagedUploadsData = self
            .execute_as(
                queries::STAGED_UPLOADS_CREATE,
                json!({ "input": [{
                    "resource": "BULK_MUTATION_VARIABLES",
                    "filename": BULK_UPLOAD_FILENAME,
                    "mimeType": BULK_UPLOAD_MIME,
                    "httpMethod": "POST",
                }]}),
                "stagedUploadsCreate",
            )
            .await?;
        let payload = data.staged_uploads_create;
        check_user_errors(payload.user_errors)?;
        payload
            .staged_targets
            .into_iter()
            .next()
            .ok_or_else(|| ShopifyError::MissingData("stagedUploadsCreate.stagedTargets".to_owned()))
    }

    /// Uploads `jsonl` to a staged target as a multipart form: every target
    /// parameter first, then the file part.
    ///
    /// The target URL belongs to the storage provider, so no access token is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::Upload`] on a non-2xx response, or
    /// [`ShopifyError::Http`] on a transport failure.
    pub async fn upload_staged(&self, target: &StagedTarget, jsonl: String) -> Result<(), ShopifyError> {
        let mut form = Form::new();
        for param in &target.parameters {
            form = form.text(param.name.clone(), param.value.clone());
        }
        let file = Part::text(jsonl)
            .file_name(BULK_UPLOAD_FILENAME)
            .mime_str(BULK_UPLOAD_MIME)?;
        form = form.part("file", file);

        let response = self.http.post(&target.url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShopifyError::Upload {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        Ok(())
    }

    /// Starts a bulk mutation that runs `mutation` once per line of the staged file.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::UserErrors`] on a submission-time validation
    /// error (for example another bulk mutation already running), or
    /// [`ShopifyError::MissingData`] when no operation comes back.
    pub async fn run_bulk_mutation(
        &self,
        mutation: &str,
        staged_upload_path: &str,
    ) -> Result<BulkOperation, ShopifyError> {
        let data: RunMutationData = self
            .execute_as(
                queries::BULK_OPERATION_RUN_MUTATION,
                json!({ "mutation": mutation, "stagedUploadPath": staged_upload_path }),
                "bulkOperationRunMutation",
            )
            .await?;
        let payload = data.bulk_operation_run_mutation;
        check_user_errors(payload.user_errors)?;
        payload.bulk_operation.ok_or_else(|| {
            ShopifyError::MissingData("bulkOperationRunMutation.bulkOperation".to_owned())
        })
    }

    /// Reads the current state of a bulk operation.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::MissingData`] if the node does not exist.
    pub async fn bulk_operation(&self, id: &str) -> Result<BulkOperation, ShopifyError> {
        let data: NodeData = self
            .execute_as(
                queries::BULK_OPERATION_STATUS,
                json!({ "id": id }),
                "bulk operation status",
            )
            .await?;
        data.node
            .ok_or_else(|| ShopifyError::MissingData(format!("bulk operation {id}")))
    }

    /// Downloads a finished operation's JSONL result file.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::UnexpectedStatus`] on a non-2xx response, or
    /// [`ShopifyError::Http`] on a transport failure.
    pub async fn fetch_result_file(&self, url: &str) -> Result<String, ShopifyError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ShopifyError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }
        Ok(response.text().await?)
    }
}
