pub mod article;
pub mod diary_entry;
pub mod exercise_log;
pub mod favorite_mark;
pub mod menu;
pub mod password_reset;
pub mod report_record;
pub mod resource;
pub mod sys_config;
pub mod user;
