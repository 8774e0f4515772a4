//! Validation, normalization and encryption of a single customer

use crate::crypto::EncryptionService;
use crate::customer::{trim_field, Customer};
use crate::error::{BatchError, Result, ValidationError};
use crate::framework::item::ItemProcessor;
use crate::validator::{CustomerValidator, Field};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// Checks fields in order and stops at the first invalid one.
///
/// The validating variant only normalizes; the encrypting variant also replaces
/// the aadhaar and PAN numbers with ciphertext once every field has passed.
#[derive(Debug, Clone)]
pub struct CustomerItemProcessor {
    validator: Arc<CustomerValidator>,
    encryption: Option<Arc<EncryptionService>>,
}

impl CustomerItemProcessor {
    /// Dry-run processor: validate and normalize, never encrypt
    pub fn validating(validator: Arc<CustomerValidator>) -> Self {
        Self {
            validator,
            encryption: None,
        }
    }

    pub fn encrypting(validator: Arc<CustomerValidator>, encryption: Arc<EncryptionService>) -> Self {
        Self {
            validator,
            encryption: Some(encryption),
        }
    }

    /// Validate and normalize every set field, failing on the first invalid one
    pub fn normalize(&self, customer: Customer) -> std::result::Result<Customer, ValidationError> {
        let record = customer.display_name().to_string();
        let mut normalized = Customer {
            id: customer.id,
            ..Customer::default()
        };

        for field in Field::ORDER {
            let Some(value) = field.value_of(&customer) else {
                continue;
            };

            if !self.validator.check(field, value) {
                return Err(ValidationError {
                    field,
                    value: value.to_string(),
                    record,
                });
            }

            let clean = normalize_field(field, value);
            match field {
                Field::Name => normalized.name = Some(clean),
                Field::Email => normalized.email = Some(clean),
                Field::PhoneNumber => normalized.phone_number = Some(clean),
                Field::AadhaarNumber => normalized.aadhaar_number = Some(clean),
                Field::PanNumber => normalized.pan_number = Some(clean),
                Field::State => normalized.state = Some(clean),
                Field::City => normalized.city = Some(clean),
            }
        }

        Ok(normalized)
    }
}

fn normalize_field(field: Field, value: &str) -> String {
    let value = trim_field(value);
    match field {
        Field::Name => value.to_string(),
        Field::Email => value.to_lowercase(),
        Field::PhoneNumber | Field::AadhaarNumber => {
            value.chars().filter(|c| c.is_ascii_digit()).collect()
        },
        Field::PanNumber | Field::State | Field::City => value.to_uppercase(),
    }
}

#[async_trait]
impl ItemProcessor<Customer, Customer> for CustomerItemProcessor {
    async fn process(&self, customer: Customer) -> Result<Customer> {
        let mut customer = self.normalize(customer)?;

        if let Some(encryption) = &self.encryption {
            customer.aadhaar_number = encryption
                .encrypt_field(customer.aadhaar_number.as_deref())
                .map_err(BatchError::from)?;
            customer.pan_number = encryption
                .encrypt_field(customer.pan_number.as_deref())
                .map_err(BatchError::from)?;
        }

        trace!(customer = %customer.display_name(), "Processed customer");
        Ok(customer)
    }
}
