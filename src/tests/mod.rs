
mod test_allow_request;
mod test_common_validation;
