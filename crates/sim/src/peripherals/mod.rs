pub mod usart;
