use store::StoreError;

use super::ApiError;

pub(super) fn map_store_error(error: StoreError) -> ApiError {
    match error {
        StoreError::Validation(err) => ApiError::BadRequest(format!("validation error: {err}")),
        StoreError::OutletNotFound(code) => ApiError::OutletNotFound(code),
        StoreError::BackupNotFound(id) => ApiError::BackupNotFound(id),
        err @ (StoreError::Read(_) | StoreError::Write(_)) => ApiError::Storage(err.to_string()),
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        map_store_error(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::ValidationError;

    #[test]
    fn storage_failures_keep_their_prefix() {
        assert_eq!(
            map_store_error(StoreError::Read("disk gone".into())),
            ApiError::Storage("Database read error: disk gone".into())
        );
        assert_eq!(
            map_store_error(StoreError::Write("locked".into())),
            ApiError::Storage("Database write error: locked".into())
        );
    }

    #[test]
    fn validation_and_lookup_failures_are_client_errors() {
        assert!(matches!(
            map_store_error(StoreError::Validation(ValidationError::InvalidRange(
                "okr.progress"
            ))),
            ApiError::BadRequest(message) if message.contains("okr.progress")
        ));
        assert_eq!(
            map_store_error(StoreError::OutletNotFound("A1".into())),
            ApiError::OutletNotFound("A1".into())
        );
    }
}
