//! Property-based tests for model types.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::model::{Object, User};

    /// Strategy to generate valid user identifiers in type:id format
    fn valid_user_strategy() -> impl Strategy<Value = String> {
        ("[a-z]{1,10}", "[a-z0-9]{1,20}").prop_map(|(t, id)| format!("{t}:{id}"))
    }

    /// Strategy to generate valid userset references in type:id#relation format
    fn userset_reference_strategy() -> impl Strategy<Value = String> {
        ("[a-z]{1,10}", "[a-z0-9]{1,10}", "[a-z]{1,10}")
            .prop_map(|(t, id, rel)| format!("{t}:{id}#{rel}"))
    }

    proptest! {
        #[test]
        fn test_user_type_id_format_is_valid(user_str in valid_user_strategy()) {
            let user = User::parse(&user_str);
            prop_assert!(user.is_ok(), "Failed for user: {}", user_str);
            let user = user.unwrap();
            prop_assert!(matches!(user, User::Object(_)));
            prop_assert_eq!(user.to_string(), user_str);
        }

        #[test]
        fn test_user_userset_reference_is_valid(user_str in userset_reference_strategy()) {
            let user = User::parse(&user_str);
            prop_assert!(user.is_ok(), "Failed for userset: {}", user_str);
            let user = user.unwrap();
            prop_assert!(matches!(user, User::Userset { .. }), "expected userset: {}", user_str);
            prop_assert_eq!(user.to_string(), user_str);
        }

        #[test]
        fn test_user_without_colon_is_invalid(s in "[a-z#]{1,20}") {
            prop_assert!(User::parse(&s).is_err(), "Should reject: {}", s);
        }

        #[test]
        fn test_object_parse_roundtrip(
            obj_type in "[a-z]{1,10}",
            obj_id in "[a-z0-9]{1,10}"
        ) {
            let input = format!("{obj_type}:{obj_id}");
            let obj = Object::parse(&input);
            prop_assert!(obj.is_ok());
            prop_assert_eq!(obj.unwrap().to_string(), input);
        }
    }
}
