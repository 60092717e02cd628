//! Audit columns shared by every table.

pub const CREATED_BY: &str = "createdBy";
pub const CREATE_DATE: &str = "createDate";
pub const UPDATED_BY: &str = "updatedBy";
pub const UPDATE_DATE: &str = "updateDate";
pub const DELETED_BY: &str = "deletedBy";
pub const DELETE_DATE: &str = "deleteDate";

pub const ALL: [&str; 4] = [CREATED_BY, CREATE_DATE, UPDATED_BY, UPDATE_DATE];
