pub mod moderation_service;
