use chrono::NaiveDate;

use tally_core::{AdmissionGrant, AdmissionRequest, AlertRecord, UsageStatus};

use crate::{Error, MeteringClient};

impl MeteringClient {
    /// Ask the metering service to admit and charge a transfer.
    ///
    /// Any error, including a timeout, must be treated as a denial.
    pub async fn authorize(&self, request: &AdmissionRequest) -> Result<AdmissionGrant, Error> {
        self.authorize_as(request, None).await
    }

    /// Like [`authorize`](Self::authorize) but on behalf of `token`.
    pub async fn authorize_as(
        &self,
        request: &AdmissionRequest,
        token: Option<&str>,
    ) -> Result<AdmissionGrant, Error> {
        let req = self.client.post(self.url("/v1/usage/record")).json(request);
        Self::json(self.send(req, token).await?).await
    }

    /// Today's bandwidth usage for the authenticated tenant.
    pub async fn usage_status(&self) -> Result<UsageStatus, Error> {
        let req = self.client.get(self.url("/v1/usage/status"));
        Self::json(self.send(req, None).await?).await
    }

    /// Alert records, optionally for one day, most recent first.
    pub async fn alerts(&self, date: Option<NaiveDate>) -> Result<Vec<AlertRecord>, Error> {
        let mut req = self.client.get(self.url("/v1/usage/alerts"));
        if let Some(day) = date {
            req = req.query(&[("date", day.to_string())]);
        }
        Self::json(self.send(req, None).await?).await
    }
}
